use std::collections::BTreeMap;

use bitcode::{Decode, Encode};
use derive_getters::{Dissolve, Getters};
use derive_more::Constructor;
use impl_tools::autoimpl;
use metabit_core_rs::refdb::ReferenceIndex;

use crate::aggregate::Coverage;

/// Summary of per-marker coverages of a single species.
#[autoimpl(for<T: trait + ?Sized> &T, Box<T>)]
pub trait Estimator: Send + Sync {
    /// Estimate the genome-equivalent coverage. The slice is never empty and may be reordered.
    fn estimate(&self, coverages: &mut [f64]) -> f64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Mean;

impl Estimator for Mean {
    fn estimate(&self, coverages: &mut [f64]) -> f64 {
        coverages.iter().sum::<f64>() / coverages.len() as f64
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Median;

impl Estimator for Median {
    fn estimate(&self, coverages: &mut [f64]) -> f64 {
        coverages.sort_by(f64::total_cmp);
        let mid = coverages.len() / 2;
        if coverages.len() % 2 == 0 {
            (coverages[mid - 1] + coverages[mid]) / 2.0
        } else {
            coverages[mid]
        }
    }
}

/// Mean after dropping `trim` fraction of the lowest and the highest coverages. At least one
/// coverage is always kept, whatever the fraction.
#[derive(Clone, Copy, Debug, Constructor)]
pub struct TrimmedMean {
    trim: f64,
}

impl Estimator for TrimmedMean {
    fn estimate(&self, coverages: &mut [f64]) -> f64 {
        coverages.sort_by(f64::total_cmp);
        let len = coverages.len();
        let drop = ((len as f64 * self.trim).floor() as usize).min(len.saturating_sub(1) / 2);
        let kept = &coverages[drop..len - drop];
        Mean.estimate(&mut kept.to_vec())
    }
}

#[derive(Encode, Decode, Clone, Copy, PartialEq, Debug, Constructor, Getters, Dissolve)]
pub struct SpeciesAbundance {
    genome_coverage: f64,
    relative_abundance: f64,
    markers_covered: u32,
}

/// Genome-equivalent coverage and relative abundance for every species with non-zero coverage.
///
/// Every marker of a species enters the summary, uncovered markers contribute zero. Species
/// without markers or with zero coverage are left out, so relative abundances sum to one whenever
/// the result is not empty.
pub fn estimate(
    index: &ReferenceIndex,
    coverage: &Coverage,
    estimator: &dyn Estimator,
) -> BTreeMap<usize, SpeciesAbundance> {
    let mut covered = BTreeMap::new();
    let mut buffer = Vec::new();
    for (ind, species) in index.species().iter().enumerate() {
        if species.markers().is_empty() {
            continue;
        }

        buffer.clear();
        buffer.extend(species.markers().iter().map(|x| coverage.mean_depth(index, *x)));
        let markers_covered = buffer.iter().filter(|x| **x > 0.0).count() as u32;
        let genome_coverage = estimator.estimate(&mut buffer);
        if genome_coverage > 0.0 {
            covered.insert(ind, (genome_coverage, markers_covered));
        }
    }

    let total: f64 = covered.values().map(|x| x.0).sum();
    covered
        .into_iter()
        .map(|(ind, (genome_coverage, markers_covered))| {
            let abundance = SpeciesAbundance::new(genome_coverage, genome_coverage / total, markers_covered);
            (ind, abundance)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimators() {
        for (coverages, mean, median, trimmed) in [
            (vec![8.0, 10.0, 12.0], 10.0, 10.0, 10.0),
            (vec![0.0, 0.0, 3.0], 1.0, 0.0, 1.0),
            (vec![1.0, 2.0, 3.0, 100.0], 26.5, 2.5, 2.5),
            (vec![5.0], 5.0, 5.0, 5.0),
        ] {
            assert_eq!(Mean.estimate(&mut coverages.clone()), mean, "{coverages:?}");
            assert_eq!(Median.estimate(&mut coverages.clone()), median, "{coverages:?}");
            assert_eq!(
                TrimmedMean::new(0.25).estimate(&mut coverages.clone()),
                trimmed,
                "{coverages:?}"
            );
        }
    }

    #[test]
    fn test_trimmed_mean_without_trimming() {
        let mut coverages = vec![1.0, 2.0, 3.0, 100.0];
        assert_eq!(TrimmedMean::new(0.0).estimate(&mut coverages), 26.5);
    }

    #[test]
    fn test_trimmed_mean_keeps_a_coverage() {
        let estimate = TrimmedMean::new(0.5).estimate(&mut [2.0, 4.0]);
        assert_eq!(estimate, 3.0);

        let estimate = TrimmedMean::new(0.75).estimate(&mut [8.0, 1.0, 3.0, 5.0]);
        assert_eq!(estimate, 4.0);

        let estimate = TrimmedMean::new(1.0).estimate(&mut [1.0, 7.0, 2.0]);
        assert_eq!(estimate, 2.0);
    }
}
