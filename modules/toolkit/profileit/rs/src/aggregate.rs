use ahash::AHashMap;
use eyre::{ensure, OptionExt, Result};
use metabit_core_rs::loc::IntervalOp;
use metabit_core_rs::nucleotide::{NucCounts, PileupColumn, GAP};
use metabit_core_rs::record::AlignmentRecord;
use metabit_core_rs::refdb::{ReferenceIndex, TargetKind};

use crate::layout::GeneLayout;

/// Per-sample coverage accumulator.
///
/// Contigs and marker genes get a dense pileup, allocated on the first accepted record. All
/// targets (including pangenome genes) track the total number of aligned bases. Accumulators are
/// merged by summation, so the result doesn't depend on how records were sharded or ordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    min_base_quality: u8,
    pileups: AHashMap<usize, Vec<NucCounts>>,
    bases: AHashMap<usize, u64>,
    // Accepted contig and gene records per species
    records: AHashMap<usize, u64>,
}

impl Accumulator {
    pub fn new(min_base_quality: u8) -> Self {
        Self {
            min_base_quality,
            ..Default::default()
        }
    }

    pub fn clear(&mut self) {
        self.pileups.clear();
        self.bases.clear();
        self.records.clear();
    }

    #[inline]
    fn counted(&self, base: u8, quality: u8) -> bool {
        base == GAP || quality >= self.min_base_quality
    }

    /// Add an accepted record aligned to the given target.
    pub fn add(
        &mut self,
        index: &ReferenceIndex,
        layout: &GeneLayout,
        target: usize,
        record: &AlignmentRecord,
    ) -> Result<()> {
        let meta = index.target(target);
        ensure!(
            record.is_well_formed() && record.end() <= *meta.length() as u64,
            "Record {} doesn't fit target {} (length {})",
            record.read(),
            meta.name(),
            meta.length()
        );
        if record.bases().is_empty() {
            return Ok(());
        }

        let start = *record.start() as usize;
        let bases = record.bases();
        let qualities = record.qualities();

        let mut aligned = 0u64;
        match meta.kind() {
            TargetKind::Contig | TargetKind::Marker => {
                let length = *meta.length() as usize;
                let pileup = self
                    .pileups
                    .entry(target)
                    .or_insert_with(|| vec![NucCounts::default(); length]);
                for (offset, (base, quality)) in bases.iter().zip(qualities).enumerate() {
                    if *base == GAP || *quality >= self.min_base_quality {
                        pileup[start + offset].add_ascii(*base);
                        aligned += (*base != GAP) as u64;
                    }
                }
            }
            TargetKind::Gene => {
                aligned = bases
                    .iter()
                    .zip(qualities)
                    .filter(|(base, quality)| **base != GAP && self.counted(**base, **quality))
                    .count() as u64;
            }
        }
        *self.bases.entry(target).or_default() += aligned;

        if *meta.kind() == TargetKind::Contig && !layout.is_empty() {
            let span = record
                .span()?
                .cast::<u32>()
                .ok_or_eyre("Alignment span doesn't fit 32-bit coordinates")?;
            for (gene, overlap) in layout.overlapping(target, span) {
                let from = (overlap.start() - span.start()) as usize;
                let to = (overlap.end() - span.start()) as usize;
                let count = bases[from..to]
                    .iter()
                    .zip(&qualities[from..to])
                    .filter(|(base, quality)| **base != GAP && self.counted(**base, **quality))
                    .count() as u64;
                *self.bases.entry(gene).or_default() += count;
            }
        }
        if *meta.kind() != TargetKind::Marker {
            *self.records.entry(*meta.species()).or_default() += 1;
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &Accumulator) {
        for (target, pileup) in &other.pileups {
            match self.pileups.get_mut(target) {
                Some(existing) => {
                    for (into, from) in existing.iter_mut().zip(pileup) {
                        into.merge(from);
                    }
                }
                None => {
                    self.pileups.insert(*target, pileup.clone());
                }
            }
        }
        for (target, bases) in &other.bases {
            *self.bases.entry(*target).or_default() += bases;
        }
        for (species, records) in &other.records {
            *self.records.entry(*species).or_default() += records;
        }
    }

    pub fn finalize(self) -> Coverage {
        Coverage {
            pileups: self.pileups,
            bases: self.bases,
            records: self.records,
        }
    }
}

/// Finalized coverage of one sample. Immutable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coverage {
    pileups: AHashMap<usize, Vec<NucCounts>>,
    bases: AHashMap<usize, u64>,
    records: AHashMap<usize, u64>,
}

impl Coverage {
    /// Total number of aligned bases (gaps excluded) counted for the target.
    pub fn aligned_bases(&self, target: usize) -> u64 {
        self.bases.get(&target).copied().unwrap_or(0)
    }

    /// Aligned bases divided by the target length.
    pub fn mean_depth(&self, index: &ReferenceIndex, target: usize) -> f64 {
        self.aligned_bases(target) as f64 / *index.target(target).length() as f64
    }

    pub fn pileup(&self, target: usize) -> Option<&[NucCounts]> {
        self.pileups.get(&target).map(|x| x.as_slice())
    }

    /// Covered columns (depth > 0) of the target, ordered by position.
    pub fn columns(&self, target: usize) -> impl Iterator<Item = PileupColumn> + '_ {
        self.pileup(target)
            .into_iter()
            .flat_map(|pileup| pileup.iter().enumerate())
            .filter(|(_, counts)| !counts.is_empty())
            .map(|(position, counts)| PileupColumn::from_counts(position as u32, *counts))
    }

    /// Accepted contig and gene records of the species.
    pub fn records(&self, species: usize) -> u64 {
        self.records.get(&species).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metabit_core_rs::loc::{Interval, Strand};
    use metabit_core_rs::refdb::DatabaseStamp;

    fn index() -> ReferenceIndex {
        let mut builder = ReferenceIndex::builder(DatabaseStamp::new("db".into(), "1".into()));
        builder
            .add_target("sp", "contig", TargetKind::Contig, 100)
            .add_target("sp", "marker", TargetKind::Marker, 1000)
            .add_target("sp", "gene", TargetKind::Gene, 50)
            .add_located_gene("sp", "placed", 10, "contig", Interval::new(10, 20).unwrap());
        builder.build().unwrap()
    }

    fn record(target: &str, start: u32, bases: &[u8], qualities: &[u8]) -> AlignmentRecord {
        AlignmentRecord::new("read", target, start, Strand::Forward, 60, 0, bases.to_vec(), qualities.to_vec())
    }

    #[test]
    fn test_pileup_counts() -> Result<()> {
        let index = index();
        let layout = GeneLayout::new(&index);
        let contig = index.target_by_name("contig")?;

        let mut acc = Accumulator::new(20);
        acc.add(&index, &layout, contig, &record("contig", 0, b"AC-T", &[30, 10, 0, 30]))?;
        acc.add(&index, &layout, contig, &record("contig", 1, b"NGG", &[30, 30, 30]))?;
        let coverage = acc.finalize();

        let pileup = coverage.pileup(contig).unwrap();
        assert_eq!(pileup.len(), 100);
        assert_eq!(pileup[0], NucCounts::new(1, 0, 0, 0, 0, 0));
        // Low quality C is not counted at all
        assert_eq!(pileup[1], NucCounts::new(0, 0, 0, 0, 1, 0));
        // Gaps ignore base qualities
        assert_eq!(pileup[2], NucCounts::new(0, 0, 1, 0, 0, 1));
        assert_eq!(pileup[3], NucCounts::new(0, 0, 1, 1, 0, 0));
        assert_eq!(coverage.aligned_bases(contig), 5);
        assert_eq!(coverage.columns(contig).count(), 4);
        assert_eq!(coverage.records(0), 2);
        Ok(())
    }

    #[test]
    fn test_marker_mean_depth() -> Result<()> {
        let index = index();
        let layout = GeneLayout::new(&index);
        let marker = index.target_by_name("marker")?;

        let mut acc = Accumulator::new(0);
        for start in 0..100 {
            acc.add(&index, &layout, marker, &AlignmentRecord::dummy("read", "marker", start * 9, &[b'A'; 100]))?;
        }
        let coverage = acc.finalize();
        assert_eq!(coverage.aligned_bases(marker), 10_000);
        assert_eq!(coverage.mean_depth(&index, marker), 10.0);
        // Marker records don't count towards species records
        assert_eq!(coverage.records(0), 0);
        Ok(())
    }

    #[test]
    fn test_gene_projection() -> Result<()> {
        let index = index();
        let layout = GeneLayout::new(&index);
        let contig = index.target_by_name("contig")?;
        let gene = index.target_by_name("gene")?;
        let placed = index.target_by_name("placed")?;

        let mut acc = Accumulator::new(0);
        // 5 bases inside the placed gene, one of them is a gap
        acc.add(&index, &layout, contig, &record("contig", 5, b"AAAAAAA-AA", &[30; 10]))?;
        acc.add(&index, &layout, gene, &AlignmentRecord::dummy("read", "gene", 0, &[b'C'; 25]))?;
        acc.add(&index, &layout, placed, &AlignmentRecord::dummy("read", "placed", 0, &[b'C'; 10]))?;
        let coverage = acc.finalize();

        assert_eq!(coverage.aligned_bases(placed), 4 + 10);
        assert_eq!(coverage.mean_depth(&index, placed), 1.4);
        assert_eq!(coverage.aligned_bases(gene), 25);
        assert_eq!(coverage.mean_depth(&index, gene), 0.5);
        assert!(coverage.pileup(gene).is_none());
        Ok(())
    }

    #[test]
    fn test_out_of_bounds() {
        let index = index();
        let layout = GeneLayout::new(&index);
        let contig = index.target_by_name("contig").unwrap();

        let mut acc = Accumulator::new(0);
        let record = AlignmentRecord::dummy("read", "contig", 95, &[b'A'; 10]);
        assert!(acc.add(&index, &layout, contig, &record).is_err());
    }

    #[test]
    fn test_merge_is_order_independent() -> Result<()> {
        let index = index();
        let layout = GeneLayout::new(&index);
        let contig = index.target_by_name("contig")?;
        let records = [
            AlignmentRecord::dummy("r1", "contig", 0, b"ACGTACGT"),
            AlignmentRecord::dummy("r2", "contig", 4, b"TTTT-TTT"),
            AlignmentRecord::dummy("r3", "contig", 12, b"GGGGGGGG"),
        ];

        let mut forward = Accumulator::new(0);
        for record in &records {
            forward.add(&index, &layout, contig, record)?;
        }

        let mut shards = Vec::new();
        for record in records.iter().rev() {
            let mut shard = Accumulator::new(0);
            shard.add(&index, &layout, contig, record)?;
            shards.push(shard);
        }
        let mut merged = Accumulator::new(0);
        for shard in &shards {
            merged.merge(shard);
        }
        assert_eq!(forward.finalize(), merged.finalize());
        Ok(())
    }
}
