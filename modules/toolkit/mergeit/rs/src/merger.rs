use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use derive_getters::{Dissolve, Getters};
use derive_more::Constructor;
use eyre::{bail, OptionExt, Report, Result};
use metabit_core_rs::nucleotide::{NucCounts, Nucleotide, TieBreakOrder};
use metabit_core_rs::num::ratio;
use metabit_core_rs::parallelism;
use metabit_core_rs::refdb::DatabaseStamp;
use metabit_core_rs::Error;
use metabit_profileit_rs::artifact;
use metabit_profileit_rs::pangenome::GeneCall;
use metabit_profileit_rs::variants::SiteCall;
use metabit_profileit_rs::{SampleProfile, SpeciesReport};
use rayon::prelude::*;

use crate::matrix::Matrix;

pub const SPECIES_INDEX: [&str; 1] = ["species_id"];
pub const GENES_INDEX: [&str; 1] = ["gene_id"];
pub const SITES_INDEX: [&str; 4] = ["target_id", "position", "major", "minor"];

/// Species that couldn't be merged because samples disagree on its reference.
#[derive(Clone, PartialEq, Eq, Debug, Constructor, Getters, Dissolve)]
pub struct SpeciesMismatch {
    species: String,
    reason: String,
}

/// Merged gene and site matrices of one species.
#[derive(Clone, PartialEq, Debug, Getters, Dissolve)]
pub struct SpeciesMatrices {
    species: String,
    gene_coverage: Matrix<f64>,
    gene_copy_number: Matrix<f64>,
    gene_presence: Matrix<bool>,
    site_depth: Matrix<u32>,
    // Frequency of the pooled minor allele, zero for sites without one
    site_minor_frequency: Matrix<f64>,
}

#[derive(Clone, PartialEq, Debug, Getters, Dissolve)]
pub struct Merged {
    database: DatabaseStamp,
    samples: Vec<String>,
    relative_abundance: Matrix<f64>,
    genome_coverage: Matrix<f64>,
    species: Vec<SpeciesMatrices>,
    mismatches: Vec<SpeciesMismatch>,
}

/// Collects per-sample profiles and merges them into samples-as-columns matrices.
///
/// Samples are kept sorted by their id, so the result doesn't depend on the order in which they
/// were added or on how the merge was split.
#[derive(Clone, Debug)]
pub struct Merger {
    database: Option<DatabaseStamp>,
    samples: Vec<SampleProfile>,
    order: Option<TieBreakOrder>,
    threads: isize,
}

impl Default for Merger {
    fn default() -> Self {
        Self {
            database: None,
            samples: Vec::new(),
            order: None,
            threads: -1,
        }
    }
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_threads(&mut self, threads: isize) -> &mut Self {
        self.threads = threads;
        self
    }

    pub fn samples(&self) -> impl Iterator<Item = &str> {
        self.samples.iter().map(|x| x.sample().as_str())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Add a sample. Adding an identical sample again is a no-op, a different sample under an
    /// already used id is an error. All samples must share the same reference database and the
    /// same nucleotide tie-break order, otherwise [`Error::MergeSetMismatch`] is returned.
    pub fn add(&mut self, profile: SampleProfile) -> Result<&mut Self> {
        let database = self.database.get_or_insert_with(|| profile.database().clone());
        if database != profile.database() {
            return Err(merge_set_mismatch(format!(
                "sample {} was profiled against {}, while the merge set uses {}",
                profile.sample(),
                profile.database(),
                database
            )));
        }
        let order = self.order.get_or_insert(*profile.tie_break_order());
        if order != profile.tie_break_order() {
            return Err(merge_set_mismatch(format!(
                "sample {} was called with the {} tie-break order, while the merge set uses {}",
                profile.sample(),
                profile.tie_break_order(),
                order
            )));
        }

        match self
            .samples
            .binary_search_by(|x| x.sample().as_str().cmp(profile.sample()))
        {
            Ok(ind) => {
                if self.samples[ind] != profile {
                    bail!(
                        "Sample {} is already present in the merge set with a different profile",
                        profile.sample()
                    );
                }
                log::debug!("Sample {} is already in the merge set, skipping", profile.sample());
            }
            Err(ind) => self.samples.insert(ind, profile),
        }
        Ok(self)
    }

    pub fn add_path(&mut self, path: impl AsRef<Path>) -> Result<&mut Self> {
        self.add(artifact::load(path)?)
    }

    /// Absorb all samples of another merge set.
    pub fn merge(&mut self, other: Merger) -> Result<&mut Self> {
        for profile in other.samples {
            self.add(profile)?;
        }
        Ok(self)
    }

    pub fn build(&self) -> Result<Merged> {
        let database = self
            .database
            .clone()
            .ok_or_eyre("Can't merge an empty set of samples")?;
        let samples: Vec<String> = self.samples().map(|x| x.to_string()).collect();
        log::info!("Merging {} samples profiled against {}", samples.len(), database);

        let (relative_abundance, genome_coverage) = self.abundance(&samples)?;

        let names: BTreeSet<&str> = self
            .samples
            .iter()
            .flat_map(|x| x.species())
            .filter(|x| *x.selected())
            .map(|x| x.species().as_str())
            .collect();

        let pool = parallelism::pool(self.threads)?;
        let merged = pool.install(|| {
            names
                .par_iter()
                .map(|name| self.species(name, &samples))
                .collect::<Vec<_>>()
        });

        let mut species = Vec::new();
        let mut mismatches = Vec::new();
        for (name, result) in names.into_iter().zip(merged) {
            match result {
                Ok(matrices) => species.push(matrices),
                Err(err) => match err.downcast_ref::<Error>() {
                    Some(Error::MergeSetMismatch { reason, .. }) => {
                        log::warn!("Species {name} is excluded from the merge: {reason}");
                        mismatches.push(SpeciesMismatch::new(name.to_string(), reason.clone()));
                    }
                    _ => return Err(err),
                },
            }
        }

        Ok(Merged {
            database,
            samples,
            relative_abundance,
            genome_coverage,
            species,
            mismatches,
        })
    }

    fn abundance(&self, samples: &[String]) -> Result<(Matrix<f64>, Matrix<f64>)> {
        let mut table: BTreeMap<&str, Vec<Option<(f64, f64)>>> = BTreeMap::new();
        for (column, profile) in self.samples.iter().enumerate() {
            for (species, abundance) in profile.detected() {
                table.entry(species).or_insert_with(|| vec![None; samples.len()])[column] =
                    Some((*abundance.relative_abundance(), *abundance.genome_coverage()));
            }
        }

        let mut relative = Matrix::new(&SPECIES_INDEX, samples.to_vec());
        let mut coverage = Matrix::new(&SPECIES_INDEX, samples.to_vec());
        for (species, cells) in table {
            relative.push(vec![species.to_string()], cells.iter().map(|x| x.map(|x| x.0)).collect())?;
            coverage.push(vec![species.to_string()], cells.iter().map(|x| x.map(|x| x.1)).collect())?;
        }
        Ok((relative, coverage))
    }

    /// Reports of the species in every sample column. Samples where the species wasn't selected
    /// for calling contribute nothing.
    fn reports(&self, species: &str) -> Result<Vec<Option<&SpeciesReport>>> {
        let reports: Vec<_> = self
            .samples
            .iter()
            .map(|x| x.species_report(species).filter(|x| *x.selected()))
            .collect();

        let mut fingerprints = reports
            .iter()
            .zip(&self.samples)
            .filter_map(|(report, profile)| report.map(|x| (*x.fingerprint(), profile.sample())));
        if let Some((expected, first)) = fingerprints.next() {
            if let Some((fingerprint, sample)) = fingerprints.find(|x| x.0 != expected) {
                return Err(Error::MergeSetMismatch {
                    scope: format!("species {species}"),
                    reason: format!(
                        "reference fingerprint {fingerprint:016x} of sample {sample} differs from {expected:016x} of sample {first}"
                    ),
                }
                .into());
            }
        }
        Ok(reports)
    }

    fn species(&self, species: &str, samples: &[String]) -> Result<SpeciesMatrices> {
        let reports = self.reports(species)?;

        // Genes called present in at least one sample
        let mut genes: BTreeMap<&str, Vec<Option<&GeneCall>>> = BTreeMap::new();
        for (column, report) in reports.iter().enumerate() {
            for call in report.iter().flat_map(|x| x.genes()) {
                genes.entry(call.gene()).or_insert_with(|| vec![None; samples.len()])[column] = Some(call);
            }
        }
        genes.retain(|_, calls| calls.iter().flatten().any(|x| *x.presence() == Some(true)));

        let mut gene_coverage = Matrix::new(&GENES_INDEX, samples.to_vec());
        let mut gene_copy_number = Matrix::new(&GENES_INDEX, samples.to_vec());
        let mut gene_presence = Matrix::new(&GENES_INDEX, samples.to_vec());
        for (gene, calls) in genes {
            let labels = vec![gene.to_string()];
            gene_coverage.push(labels.clone(), calls.iter().map(|x| x.map(|x| *x.coverage())).collect())?;
            gene_copy_number.push(labels.clone(), calls.iter().map(|x| x.and_then(|x| *x.copy_number())).collect())?;
            gene_presence.push(labels, calls.iter().map(|x| x.and_then(|x| *x.presence())).collect())?;
        }

        // Sites called in at least one sample
        let mut sites: BTreeMap<(&str, u32), Vec<Option<&SiteCall>>> = BTreeMap::new();
        for (column, report) in reports.iter().enumerate() {
            for target in report.iter().flat_map(|x| x.sites()) {
                for call in target.calls() {
                    sites
                        .entry((target.target().as_str(), *call.position()))
                        .or_insert_with(|| vec![None; samples.len()])[column] = Some(call);
                }
            }
        }
        sites.retain(|_, calls| calls.iter().flatten().any(|x| x.is_called()));

        let mut site_depth = Matrix::new(&SITES_INDEX, samples.to_vec());
        let mut site_minor_frequency = Matrix::new(&SITES_INDEX, samples.to_vec());
        for ((target, position), calls) in sites {
            let (major, minor) = self.pooled_alleles(&calls);
            let labels = vec![
                target.to_string(),
                position.to_string(),
                major.map(|x| x.to_string()).unwrap_or_else(|| "NA".to_string()),
                minor.map(|x| x.to_string()).unwrap_or_else(|| "NA".to_string()),
            ];

            let frequencies = calls
                .iter()
                .map(|call| {
                    let call = call.filter(|x| x.is_called())?;
                    match minor {
                        Some(minor) => ratio(call.counts().get(minor), *call.depth()),
                        None => Some(0.0),
                    }
                })
                .collect();
            site_depth.push(labels.clone(), calls.iter().map(|x| x.map(|x| *x.depth())).collect())?;
            site_minor_frequency.push(labels, frequencies)?;
        }

        Ok(SpeciesMatrices {
            species: species.to_string(),
            gene_coverage,
            gene_copy_number,
            gene_presence,
            site_depth,
            site_minor_frequency,
        })
    }

    /// Major and minor alleles of the site in the allele counts pooled across the called samples.
    fn pooled_alleles(&self, calls: &[Option<&SiteCall>]) -> (Option<Nucleotide>, Option<Nucleotide>) {
        let mut pooled = NucCounts::default();
        for call in calls.iter().flatten().filter(|x| x.is_called()) {
            pooled.merge(call.counts());
        }
        let ranked = self.order.unwrap_or_default().ranked(&pooled);
        let allele = |nuc: Nucleotide| Some(nuc).filter(|x| pooled.get(*x) > 0);
        (allele(ranked[0]), allele(ranked[1]))
    }
}

fn merge_set_mismatch(reason: String) -> Report {
    Error::MergeSetMismatch {
        scope: "the merge set".to_string(),
        reason,
    }
    .into()
}
