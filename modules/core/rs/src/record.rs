use derive_getters::{Dissolve, Getters};
use eyre::{ensure, Result};

use crate::loc::{Interval, Strand};

/// Read of a sequenced fragment an alignment comes from.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
pub enum Segment {
    /// Single-end read.
    #[default]
    Single,
    First,
    Last,
}

/// A single read aligned to a reference target.
///
/// `bases` and `qualities` are projected onto reference positions: the i-th element describes
/// reference position `start + i`. Deletions are encoded as [`crate::nucleotide::GAP`], insertions
/// and soft clips are not represented at all.
#[derive(Clone, PartialEq, Eq, Debug, Getters, Dissolve)]
pub struct AlignmentRecord {
    read: String,
    target: String,
    start: u32,
    strand: Strand,
    mapq: u8,
    edit_distance: u32,
    bases: Vec<u8>,
    qualities: Vec<u8>,
    segment: Segment,
}

impl AlignmentRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        read: impl Into<String>,
        target: impl Into<String>,
        start: u32,
        strand: Strand,
        mapq: u8,
        edit_distance: u32,
        bases: Vec<u8>,
        qualities: Vec<u8>,
    ) -> Self {
        Self {
            read: read.into(),
            target: target.into(),
            start,
            strand,
            mapq,
            edit_distance,
            bases,
            qualities,
            segment: Segment::Single,
        }
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segment = segment;
        self
    }

    /// Number of reference positions spanned by the alignment.
    pub fn aligned_length(&self) -> u32 {
        self.bases.len() as u32
    }

    /// Exclusive end of the aligned span.
    pub fn end(&self) -> u64 {
        self.start as u64 + self.bases.len() as u64
    }

    /// Aligned span on the target, empty alignments have none.
    pub fn span(&self) -> Result<Interval<u64>> {
        ensure!(!self.bases.is_empty(), "Alignment {} has an empty aligned span", self.read);
        Interval::new(self.start as u64, self.end())
    }

    /// 100 x (aligned length - edit distance) / aligned length, saturating at zero.
    pub fn percent_identity(&self) -> f64 {
        let length = self.aligned_length();
        if length == 0 {
            return 0.0;
        }
        100.0 * length.saturating_sub(self.edit_distance) as f64 / length as f64
    }

    /// Alignment score used to pick the best hit of a read.
    pub fn score(&self) -> i64 {
        self.aligned_length() as i64 - self.edit_distance as i64
    }

    /// Base qualities cover every aligned position. Qualities at gap positions are ignored.
    pub fn is_well_formed(&self) -> bool {
        self.qualities.len() == self.bases.len()
    }

    /// Record with perfect qualities on the forward strand, handy for tests and synthetic inputs.
    pub fn dummy(read: &str, target: &str, start: u32, bases: &[u8]) -> Self {
        Self::new(
            read,
            target,
            start,
            Strand::Forward,
            60,
            0,
            bases.to_vec(),
            vec![40; bases.len()],
        )
    }
}
