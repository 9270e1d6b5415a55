use bitcode::{Decode, Encode};
use derive_getters::{Dissolve, Getters};
use derive_more::Constructor;
use impl_tools::autoimpl;
use metabit_core_rs::refdb::{ReferenceIndex, Species};

use crate::aggregate::Coverage;

/// Decides whether a gene is present given its coverage and the genome-equivalent coverage of its
/// species. Only consulted when the genome-equivalent coverage is positive.
#[autoimpl(for<T: trait + ?Sized> &T, Box<T>)]
pub trait PresenceRule: Send + Sync {
    fn is_present(&self, gene_coverage: f64, genome_coverage: f64) -> bool;
}

/// Present when the gene coverage reaches a fixed fraction of the genome-equivalent coverage.
#[derive(Clone, Copy, PartialEq, Debug, Constructor)]
pub struct FractionOfGenome {
    fraction: f64,
}

impl PresenceRule for FractionOfGenome {
    fn is_present(&self, gene_coverage: f64, genome_coverage: f64) -> bool {
        gene_coverage >= self.fraction * genome_coverage
    }
}

/// Presence and copy number of one pangenome gene in one sample. Both are missing when the
/// species' genome-equivalent coverage is zero.
#[derive(Encode, Decode, Clone, PartialEq, Debug, Constructor, Getters, Dissolve)]
pub struct GeneCall {
    gene: String,
    coverage: f64,
    presence: Option<bool>,
    copy_number: Option<f64>,
}

/// Call every pangenome gene of the species. Undetected species still get a call per gene with
/// the observed coverage.
pub fn call_genes(
    index: &ReferenceIndex,
    species: &Species,
    coverage: &Coverage,
    genome_coverage: Option<f64>,
    rule: &dyn PresenceRule,
) -> Vec<GeneCall> {
    let genome_coverage = genome_coverage.filter(|x| *x > 0.0);
    species
        .genes()
        .iter()
        .map(|gene| {
            let gene_coverage = coverage.mean_depth(index, *gene);
            let (presence, copy_number) = match genome_coverage {
                Some(genome) => (
                    Some(rule.is_present(gene_coverage, genome)),
                    Some(gene_coverage / genome),
                ),
                None => (None, None),
            };
            GeneCall::new(
                index.target(*gene).name().clone(),
                gene_coverage,
                presence,
                copy_number,
            )
        })
        .collect()
}
