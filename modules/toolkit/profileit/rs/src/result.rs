use bitcode::{Decode, Encode};
use derive_getters::{Dissolve, Getters};
use derive_more::Constructor;
use metabit_core_rs::nucleotide::TieBreakOrder;
use metabit_core_rs::refdb::DatabaseStamp;

use crate::abundance::SpeciesAbundance;
use crate::filter::FilterStats;
use crate::pangenome::GeneCall;
use crate::variants::SiteCall;

/// Site calls of a single contig, ordered by position.
#[derive(Encode, Decode, Clone, PartialEq, Debug, Constructor, Getters, Dissolve)]
pub struct TargetSites {
    target: String,
    calls: Vec<SiteCall>,
}

#[derive(Encode, Decode, Clone, PartialEq, Debug, Constructor, Getters, Dissolve)]
pub struct SpeciesReport {
    species: String,
    // Reference fingerprint, samples are only merged when it matches
    fingerprint: u64,
    // Passed the abundance threshold, genes and sites are only called for selected species
    selected: bool,
    abundance: Option<SpeciesAbundance>,
    genes: Vec<GeneCall>,
    sites: Vec<TargetSites>,
}

#[derive(Encode, Decode, Clone, PartialEq, Eq, Debug, Constructor, Getters, Dissolve)]
pub struct CorruptTarget {
    target: String,
    reason: String,
}

#[derive(Encode, Decode, Clone, PartialEq, Eq, Debug, Default, Getters, Dissolve)]
pub struct Diagnostics {
    // Records read from the input
    records: u64,
    filter: FilterStats,
    // Alignments dropped by the best-hit assignment
    best_hit_discarded: u64,
    // Reads whose best score was shared between species
    ambiguous_reads: u64,
    malformed_columns: u64,
    corrupt_targets: Vec<CorruptTarget>,
    unselected_species: Vec<String>,
}

impl Diagnostics {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        records: u64,
        filter: FilterStats,
        best_hit_discarded: u64,
        ambiguous_reads: u64,
        malformed_columns: u64,
        corrupt_targets: Vec<CorruptTarget>,
        unselected_species: Vec<String>,
    ) -> Self {
        Self {
            records,
            filter,
            best_hit_discarded,
            ambiguous_reads,
            malformed_columns,
            corrupt_targets,
            unselected_species,
        }
    }

    pub fn log(&self, sample: &str) {
        log::info!(
            "Sample {sample}: {} records, {} accepted, {} rejected",
            self.records,
            self.filter.accepted(),
            self.filter.total_rejected()
        );
        for reason in crate::filter::RejectReason::ALL {
            let count = self.filter.rejected(reason);
            if count > 0 {
                log::info!("Sample {sample}: {count} records rejected as {reason}");
            }
        }
        if self.best_hit_discarded > 0 {
            log::info!(
                "Sample {sample}: {} alignments discarded by best-hit assignment ({} ambiguous reads)",
                self.best_hit_discarded,
                self.ambiguous_reads
            );
        }
        if self.malformed_columns > 0 {
            log::warn!("Sample {sample}: {} malformed pileup columns skipped", self.malformed_columns);
        }
        for corrupt in &self.corrupt_targets {
            log::warn!(
                "Sample {sample}: calls for {} were dropped: {}",
                corrupt.target,
                corrupt.reason
            );
        }
        if !self.unselected_species.is_empty() {
            log::info!(
                "Sample {sample}: {} species below the abundance threshold",
                self.unselected_species.len()
            );
        }
    }
}

/// Immutable per-sample result, the unit consumed by the cross-sample merger.
#[derive(Encode, Decode, Clone, PartialEq, Debug, Constructor, Getters, Dissolve)]
pub struct SampleProfile {
    sample: String,
    database: DatabaseStamp,
    // Nucleotide precedence used to call the sites
    tie_break_order: TieBreakOrder,
    // Every species of the reference, sorted by name
    species: Vec<SpeciesReport>,
    diagnostics: Diagnostics,
}

impl SampleProfile {
    pub fn species_report(&self, species: &str) -> Option<&SpeciesReport> {
        self.species
            .binary_search_by(|x| x.species.as_str().cmp(species))
            .ok()
            .map(|ind| &self.species[ind])
    }

    /// Species with non-zero genome-equivalent coverage.
    pub fn detected(&self) -> impl Iterator<Item = (&str, &SpeciesAbundance)> {
        self.species
            .iter()
            .filter_map(|x| x.abundance.as_ref().map(|abundance| (x.species.as_str(), abundance)))
    }
}
