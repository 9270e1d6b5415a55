//! Placement of pangenome genes on representative contigs, queried with the BITS strategy
//! (sorted starts + maximum interval length as the lower search bound).

use ahash::AHashMap;
use itertools::Itertools;
use metabit_core_rs::loc::{Interval, IntervalOp};
use metabit_core_rs::refdb::ReferenceIndex;

#[derive(Debug, Clone, Default)]
struct ContigGenes {
    starts: Vec<u32>,
    ends: Vec<u32>,
    genes: Vec<usize>,
    max_len: u32,
}

impl ContigGenes {
    fn new(genes: impl IntoIterator<Item = (Interval<u32>, usize)>) -> Self {
        let mut result = Self::default();
        for (interval, gene) in genes.into_iter().sorted_by_key(|(it, gene)| (it.start(), *gene)) {
            result.starts.push(interval.start());
            result.ends.push(interval.end());
            result.genes.push(gene);
            result.max_len = result.max_len.max(interval.len());
        }
        result
    }

    fn lower_bound(&self, start: u32) -> usize {
        let boundary = start.saturating_sub(self.max_len);
        self.starts.partition_point(|x| *x < boundary)
    }

    fn query(&self, query: Interval<u32>) -> impl Iterator<Item = (usize, Interval<u32>)> + '_ {
        let cursor = self.lower_bound(query.start());
        (cursor..self.starts.len())
            .take_while(move |ind| self.starts[*ind] < query.end())
            .filter_map(move |ind| {
                let interval = Interval::new(self.starts[ind], self.ends[ind]).ok()?;
                let overlap = interval.intersection(&query)?;
                Some((self.genes[ind], overlap))
            })
    }
}

/// For each contig with placed genes, the genes sorted by their start position.
#[derive(Debug, Clone, Default)]
pub struct GeneLayout {
    contigs: AHashMap<usize, ContigGenes>,
}

impl GeneLayout {
    pub fn new(index: &ReferenceIndex) -> Self {
        let mut placed: AHashMap<usize, Vec<(Interval<u32>, usize)>> = AHashMap::new();
        for (ind, target) in index.targets().iter().enumerate() {
            if let Some(location) = target.location() {
                placed
                    .entry(*location.contig())
                    .or_default()
                    .push((*location.interval(), ind));
            }
        }

        let contigs = placed
            .into_iter()
            .map(|(contig, genes)| (contig, ContigGenes::new(genes)))
            .collect();
        Self { contigs }
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    /// Genes placed on the contig that overlap the query, with the overlapping part of the query.
    pub fn overlapping(
        &self,
        contig: usize,
        query: Interval<u32>,
    ) -> impl Iterator<Item = (usize, Interval<u32>)> + '_ {
        self.contigs
            .get(&contig)
            .into_iter()
            .flat_map(move |genes| genes.query(query))
    }
}
