use std::fmt::Display;

use bitcode::{Decode, Encode};
use metabit_core_rs::loc::Strand;
use metabit_core_rs::record::AlignmentRecord;
use metabit_core_rs::refdb::ReferenceIndex;

use crate::config::Config;

#[derive(Encode, Decode, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum RejectReason {
    MissingReferenceEntry,
    Malformed,
    OutOfBounds,
    LowMappingQuality,
    LowIdentity,
    ShortAlignment,
    DisallowedStrand,
    SpeciesNotSelected,
}

impl RejectReason {
    pub const ALL: [RejectReason; 8] = [
        RejectReason::MissingReferenceEntry,
        RejectReason::Malformed,
        RejectReason::OutOfBounds,
        RejectReason::LowMappingQuality,
        RejectReason::LowIdentity,
        RejectReason::ShortAlignment,
        RejectReason::DisallowedStrand,
        RejectReason::SpeciesNotSelected,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            RejectReason::MissingReferenceEntry => "missing_reference_entry",
            RejectReason::Malformed => "malformed",
            RejectReason::OutOfBounds => "out_of_bounds",
            RejectReason::LowMappingQuality => "low_mapping_quality",
            RejectReason::LowIdentity => "low_identity",
            RejectReason::ShortAlignment => "short_alignment",
            RejectReason::DisallowedStrand => "disallowed_strand",
            RejectReason::SpeciesNotSelected => "species_not_selected",
        }
    }
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Accepted records and per-reason rejection counters.
#[derive(Encode, Decode, Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct FilterStats {
    accepted: u64,
    rejected: [u64; RejectReason::ALL.len()],
}

impl FilterStats {
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self, reason: RejectReason) -> u64 {
        self.rejected[reason.index()]
    }

    pub fn total_rejected(&self) -> u64 {
        self.rejected.iter().sum()
    }

    pub fn total(&self) -> u64 {
        self.accepted + self.total_rejected()
    }

    pub fn accept(&mut self) {
        self.accepted += 1;
    }

    pub fn reject(&mut self, reason: RejectReason) {
        self.rejected[reason.index()] += 1;
    }

    /// Move previously accepted records to the rejected bucket.
    pub fn revoke(&mut self, reason: RejectReason, records: u64) {
        let records = records.min(self.accepted);
        self.accepted -= records;
        self.rejected[reason.index()] += records;
    }

    pub fn merge(&mut self, other: &FilterStats) {
        self.accepted += other.accepted;
        for (into, from) in self.rejected.iter_mut().zip(&other.rejected) {
            *into += from;
        }
    }
}

/// Screens individual alignment records before they contribute to any statistic.
#[derive(Clone, Debug)]
pub struct AlignmentFilter<'a> {
    index: &'a ReferenceIndex,
    min_mapping_quality: u8,
    min_percent_identity: f64,
    min_aligned_length: u32,
    allowed_strands: [bool; 2],
}

impl<'a> AlignmentFilter<'a> {
    pub fn new(index: &'a ReferenceIndex, config: &Config) -> Self {
        let mut allowed_strands = [false; 2];
        for strand in config.allowed_strands() {
            allowed_strands[strand.index()] = true;
        }
        Self {
            index,
            min_mapping_quality: *config.min_mapping_quality(),
            min_percent_identity: *config.min_percent_identity(),
            min_aligned_length: *config.min_aligned_length(),
            allowed_strands,
        }
    }

    /// Target id of an acceptable record or the first reason to reject it.
    pub fn check(&self, record: &AlignmentRecord) -> Result<usize, RejectReason> {
        let target = self
            .index
            .find_target(record.target())
            .ok_or(RejectReason::MissingReferenceEntry)?;

        if !record.is_well_formed() || record.bases().is_empty() {
            return Err(RejectReason::Malformed);
        }
        if record.end() > *self.index.target(target).length() as u64 {
            return Err(RejectReason::OutOfBounds);
        }
        if *record.mapq() < self.min_mapping_quality {
            return Err(RejectReason::LowMappingQuality);
        }
        if record.percent_identity() < self.min_percent_identity {
            return Err(RejectReason::LowIdentity);
        }
        if record.aligned_length() < self.min_aligned_length {
            return Err(RejectReason::ShortAlignment);
        }
        if !self.is_allowed(*record.strand()) {
            return Err(RejectReason::DisallowedStrand);
        }
        Ok(target)
    }

    /// Same as [`Self::check`], but the outcome is recorded in the stats.
    pub fn apply(&self, record: &AlignmentRecord, stats: &mut FilterStats) -> Option<usize> {
        match self.check(record) {
            Ok(target) => {
                stats.accept();
                Some(target)
            }
            Err(reason) => {
                stats.reject(reason);
                None
            }
        }
    }

    fn is_allowed(&self, strand: Strand) -> bool {
        self.allowed_strands[strand.index()]
    }
}
