use eyre::{Result, WrapErr};
use metabit_core_rs::record::AlignmentRecord;
use metabit_core_rs::refdb::{ReferenceIndex, TargetKind};

use crate::aggregate::Accumulator;
use crate::assign::ReadAssigner;
use crate::config::MultimapPolicy;
use crate::filter::{AlignmentFilter, FilterStats};
use crate::layout::GeneLayout;

/// Read-only state shared by all workers during the streaming pass.
pub struct Pass<'a> {
    pub index: &'a ReferenceIndex,
    pub filter: AlignmentFilter<'a>,
    pub layout: &'a GeneLayout,
    pub policy: MultimapPolicy,
}

/// Thread-local state of the streaming pass.
pub struct Worker {
    accumulator: Accumulator,
    // Contig and gene alignments waiting for the best-hit assignment
    assigner: ReadAssigner,
    stats: FilterStats,
}

impl Worker {
    pub fn new(min_base_quality: u8) -> Self {
        Self {
            accumulator: Accumulator::new(min_base_quality),
            assigner: ReadAssigner::default(),
            stats: FilterStats::default(),
        }
    }

    pub fn reset(&mut self, min_base_quality: u8) {
        self.accumulator = Accumulator::new(min_base_quality);
        self.assigner.clear();
        self.stats = FilterStats::default();
    }

    pub fn process(&mut self, pass: &Pass, batch: Vec<AlignmentRecord>) -> Result<()> {
        for record in batch {
            let target = match pass.filter.apply(&record, &mut self.stats) {
                Some(target) => target,
                None => continue,
            };

            let buffered = pass.policy == MultimapPolicy::BestHit
                && *pass.index.target(target).kind() != TargetKind::Marker;
            if buffered {
                self.assigner.add(pass.index, target, record);
            } else {
                self.accumulator
                    .add(pass.index, pass.layout, target, &record)
                    .wrap_err_with(|| format!("Failed to accumulate record {}", record.read()))?;
            }
        }
        Ok(())
    }

    /// Sum-merge the state of all workers.
    pub fn aggregate<'a>(
        min_base_quality: u8,
        workers: impl Iterator<Item = &'a mut Self>,
    ) -> (Accumulator, ReadAssigner, FilterStats) {
        let mut accumulator = Accumulator::new(min_base_quality);
        let mut assigner = ReadAssigner::default();
        let mut stats = FilterStats::default();

        for worker in workers {
            accumulator.merge(&worker.accumulator);
            assigner.merge(&mut worker.assigner);
            stats.merge(&worker.stats);
            worker.accumulator.clear();
        }
        (accumulator, assigner, stats)
    }
}
