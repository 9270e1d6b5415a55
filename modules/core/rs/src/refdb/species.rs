use derive_getters::Getters;

use super::TargetKind;

/// Species with the ids of its targets grouped by kind.
///
/// The fingerprint summarizes the species' reference targets (names, kinds, lengths and gene
/// placements). Two samples can only be merged for a species when the fingerprints agree.
#[derive(Clone, PartialEq, Eq, Debug, Getters)]
pub struct Species {
    name: String,
    contigs: Vec<usize>,
    genes: Vec<usize>,
    markers: Vec<usize>,
    fingerprint: u64,
}

impl Species {
    pub(super) fn new(name: String) -> Self {
        Self {
            name,
            contigs: Vec::new(),
            genes: Vec::new(),
            markers: Vec::new(),
            fingerprint: 0,
        }
    }

    pub(super) fn push(&mut self, kind: TargetKind, target: usize) {
        match kind {
            TargetKind::Contig => self.contigs.push(target),
            TargetKind::Gene => self.genes.push(target),
            TargetKind::Marker => self.markers.push(target),
        }
    }

    pub(super) fn set_fingerprint(&mut self, fingerprint: u64) {
        self.fingerprint = fingerprint;
    }

    pub fn targets(&self) -> impl Iterator<Item = usize> + '_ {
        self.contigs.iter().chain(&self.genes).chain(&self.markers).copied()
    }
}
