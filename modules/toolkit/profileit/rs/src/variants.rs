use std::fmt::Display;

use bitcode::{Decode, Encode};
use derive_getters::{Dissolve, Getters};
use eyre::Result;
use metabit_core_rs::nucleotide::{NucCounts, Nucleotide, PileupColumn, TieBreakOrder};
use metabit_core_rs::num::ratio;
use metabit_core_rs::Error;

use crate::config::Config;

#[derive(Encode, Decode, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum QualityFlag {
    Pass,
    InsufficientDepth,
    AmbiguousConsensus,
}

impl QualityFlag {
    pub fn symbol(&self) -> &'static str {
        match self {
            QualityFlag::Pass => "PASS",
            QualityFlag::InsufficientDepth => "INSUFFICIENT_DEPTH",
            QualityFlag::AmbiguousConsensus => "AMBIGUOUS_CONSENSUS",
        }
    }
}

impl Display for QualityFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Consensus and alternate allele of one covered reference position.
///
/// Frequencies are allele counts divided by the total column depth, so they are always within
/// [0, 1] and the consensus frequency is never below the alternate one.
#[derive(Encode, Decode, Clone, PartialEq, Debug, Getters, Dissolve)]
pub struct SiteCall {
    position: u32,
    depth: u32,
    counts: NucCounts,
    consensus: Option<Nucleotide>,
    alt: Option<Nucleotide>,
    flag: QualityFlag,
}

impl SiteCall {
    fn frequency(&self, allele: Option<Nucleotide>) -> Option<f64> {
        ratio(self.counts.get(allele?), self.depth)
    }

    pub fn consensus_frequency(&self) -> Option<f64> {
        self.frequency(self.consensus)
    }

    pub fn alt_frequency(&self) -> Option<f64> {
        self.frequency(self.alt)
    }

    /// Site carries frequency-bearing alleles.
    pub fn is_called(&self) -> bool {
        self.flag != QualityFlag::InsufficientDepth
    }
}

/// Per-target outcome of the variant caller.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct TargetCalls {
    pub calls: Vec<SiteCall>,
    /// Columns whose depth disagrees with the sum of their counts.
    pub malformed: u64,
}

#[derive(Clone, PartialEq, Eq, Debug, Getters)]
pub struct VariantCaller {
    min_site_depth: u32,
    min_allele_count: u32,
    order: TieBreakOrder,
}

impl VariantCaller {
    pub fn new(min_site_depth: u32, min_allele_count: u32, order: TieBreakOrder) -> Self {
        Self {
            min_site_depth,
            min_allele_count,
            order,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            *config.min_site_depth(),
            *config.min_allele_count(),
            *config.nucleotide_tie_break_order(),
        )
    }

    /// Call a single, consistent pileup column.
    pub fn call(&self, column: &PileupColumn) -> SiteCall {
        let counts = *column.counts();
        let depth = *column.depth();

        let mut call = SiteCall {
            position: *column.position(),
            depth,
            counts,
            consensus: None,
            alt: None,
            flag: QualityFlag::InsufficientDepth,
        };
        if depth < self.min_site_depth || counts.nucleotides() == 0 {
            return call;
        }

        let ranked = self.order.ranked(&counts);
        let (first, second) = (counts.get(ranked[0]), counts.get(ranked[1]));
        call.consensus = Some(ranked[0]);
        if second > 0 && second >= self.min_allele_count {
            call.alt = Some(ranked[1]);
        }
        call.flag = match first == second {
            true => QualityFlag::AmbiguousConsensus,
            false => QualityFlag::Pass,
        };
        call
    }

    /// Call columns of one target. Columns must be ordered by position and lie within the target.
    ///
    /// Inconsistent columns are skipped and counted. A column outside the target or out of order
    /// means the pileup doesn't match the reference, the whole target fails with
    /// [`Error::CorruptDatabaseIndex`].
    pub fn call_target(
        &self,
        target: &str,
        length: u32,
        columns: impl IntoIterator<Item = PileupColumn>,
    ) -> Result<TargetCalls> {
        let mut result = TargetCalls::default();
        let mut previous: Option<u32> = None;
        for column in columns {
            let position = *column.position();
            if position >= length {
                return Err(Error::CorruptDatabaseIndex {
                    target: target.to_string(),
                    reason: format!("pileup column {position} is outside the target (length {length})"),
                }
                .into());
            }
            if previous.is_some_and(|x| x >= position) {
                return Err(Error::CorruptDatabaseIndex {
                    target: target.to_string(),
                    reason: format!("pileup column {position} is out of order"),
                }
                .into());
            }
            previous = Some(position);

            if !column.is_consistent() {
                result.malformed += 1;
                continue;
            }
            result.calls.push(self.call(&column));
        }
        Ok(result)
    }
}
