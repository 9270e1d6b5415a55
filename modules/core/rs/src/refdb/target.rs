use std::fmt::Display;

#[cfg(feature = "bitcode")]
use bitcode::{Decode, Encode};
use derive_getters::{Dissolve, Getters};
use derive_more::Constructor;
use eyre::{eyre, Report, Result};

use crate::loc::Interval;

#[cfg_attr(feature = "bitcode", derive(Encode, Decode))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum TargetKind {
    /// Representative genome contig, carries a dense pileup and site calls.
    Contig,
    /// Pangenome gene, only the total number of aligned bases is tracked.
    Gene,
    /// Marker gene, carries a dense pileup used for species abundance.
    Marker,
}

impl TargetKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            TargetKind::Contig => "contig",
            TargetKind::Gene => "gene",
            TargetKind::Marker => "marker",
        }
    }

    /// Whether per-position pileups are collected for targets of this kind.
    pub fn is_pileup(&self) -> bool {
        !matches!(self, TargetKind::Gene)
    }
}

impl Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl TryFrom<&str> for TargetKind {
    type Error = Report;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "contig" => Ok(TargetKind::Contig),
            "gene" => Ok(TargetKind::Gene),
            "marker" => Ok(TargetKind::Marker),
            _ => Err(eyre!("Unknown target kind: {value}. Expected one of: contig, gene, marker")),
        }
    }
}

/// Placement of a pangenome gene on a representative contig of the same species.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Constructor, Getters, Dissolve)]
pub struct GeneLocation {
    contig: usize,
    interval: Interval<u32>,
}

/// Immutable reference target. Ids are positions in the owning [`super::ReferenceIndex`].
#[derive(Clone, PartialEq, Eq, Debug, Getters, Dissolve)]
pub struct Target {
    name: String,
    species: usize,
    kind: TargetKind,
    length: u32,
    location: Option<GeneLocation>,
}

impl Target {
    pub(super) fn new(
        name: String,
        species: usize,
        kind: TargetKind,
        length: u32,
        location: Option<GeneLocation>,
    ) -> Self {
        Self {
            name,
            species,
            kind,
            length,
            location,
        }
    }
}
