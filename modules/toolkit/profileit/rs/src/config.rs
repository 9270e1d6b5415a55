use std::path::Path;

use derive_getters::{Dissolve, Getters};
use eyre::{ensure, Result, WrapErr};
use metabit_core_rs::loc::Strand;
use metabit_core_rs::nucleotide::TieBreakOrder;
use serde::{Deserialize, Serialize};

use crate::abundance::{Estimator, Mean, Median, TrimmedMean};

/// Summary used to turn marker-gene coverages into a genome-equivalent coverage.
#[derive(Clone, Copy, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoverageEstimator {
    #[default]
    Mean,
    Median,
    /// Drop `trim` fraction of the lowest and the highest coverages before averaging.
    TrimmedMean { trim: f64 },
}

impl CoverageEstimator {
    pub fn build(&self) -> Box<dyn Estimator> {
        match self {
            CoverageEstimator::Mean => Box::new(Mean),
            CoverageEstimator::Median => Box::new(Median),
            CoverageEstimator::TrimmedMean { trim } => Box::new(TrimmedMean::new(*trim)),
        }
    }
}

/// What to do with reads aligned to several genomes or genes.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultimapPolicy {
    /// Every accepted alignment contributes to coverage.
    #[default]
    KeepAll,
    /// Only the best-scoring alignment of each read contributes, ties between species are
    /// resolved by species abundance.
    BestHit,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize, Getters, Dissolve)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    // Alignment filter
    min_mapping_quality: u8,
    min_percent_identity: f64,
    min_aligned_length: u32,
    allowed_strands: Vec<Strand>,
    // Coverage aggregation
    min_base_quality: u8,
    multimap_policy: MultimapPolicy,
    // Species & gene calling
    coverage_estimator: CoverageEstimator,
    gene_presence_threshold_fraction: f64,
    min_species_abundance: f64,
    // Site calling
    min_site_depth: u32,
    min_allele_count: u32,
    nucleotide_tie_break_order: TieBreakOrder,
    // Execution
    threads: isize,
    batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_mapping_quality: 0,
            min_percent_identity: 90.0,
            min_aligned_length: 30,
            allowed_strands: Strand::ALL.to_vec(),
            min_base_quality: 0,
            multimap_policy: MultimapPolicy::default(),
            coverage_estimator: CoverageEstimator::default(),
            gene_presence_threshold_fraction: 0.1,
            min_species_abundance: 0.0,
            min_site_depth: 5,
            min_allele_count: 2,
            nucleotide_tie_break_order: TieBreakOrder::default(),
            threads: -1,
            batch_size: 1024,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration. Missing options take their default values, unknown options
    /// are rejected. The result is validated.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json).wrap_err("Failed to parse the configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read the configuration from {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=100.0).contains(&self.min_percent_identity),
            "min_percent_identity must be within [0, 100], got {}",
            self.min_percent_identity
        );
        ensure!(!self.allowed_strands.is_empty(), "allowed_strands must not be empty");
        ensure!(
            self.gene_presence_threshold_fraction.is_finite() && self.gene_presence_threshold_fraction >= 0.0,
            "gene_presence_threshold_fraction must be a non-negative number, got {}",
            self.gene_presence_threshold_fraction
        );
        ensure!(
            (0.0..=1.0).contains(&self.min_species_abundance),
            "min_species_abundance must be within [0, 1], got {}",
            self.min_species_abundance
        );
        ensure!(self.min_site_depth > 0, "min_site_depth must be positive");
        ensure!(self.min_allele_count > 0, "min_allele_count must be positive");
        ensure!(self.batch_size > 0, "batch_size must be positive");
        if let CoverageEstimator::TrimmedMean { trim } = self.coverage_estimator {
            ensure!(
                (0.0..0.5).contains(&trim),
                "Trimmed mean fraction must be within [0, 0.5), got {trim}"
            );
        }
        Ok(())
    }

    pub fn set_min_mapping_quality(&mut self, min_mapping_quality: u8) -> &mut Self {
        self.min_mapping_quality = min_mapping_quality;
        self
    }

    pub fn set_min_percent_identity(&mut self, min_percent_identity: f64) -> &mut Self {
        self.min_percent_identity = min_percent_identity;
        self
    }

    pub fn set_min_aligned_length(&mut self, min_aligned_length: u32) -> &mut Self {
        self.min_aligned_length = min_aligned_length;
        self
    }

    pub fn set_allowed_strands(&mut self, allowed_strands: Vec<Strand>) -> &mut Self {
        self.allowed_strands = allowed_strands;
        self
    }

    pub fn set_min_base_quality(&mut self, min_base_quality: u8) -> &mut Self {
        self.min_base_quality = min_base_quality;
        self
    }

    pub fn set_multimap_policy(&mut self, multimap_policy: MultimapPolicy) -> &mut Self {
        self.multimap_policy = multimap_policy;
        self
    }

    pub fn set_coverage_estimator(&mut self, coverage_estimator: CoverageEstimator) -> &mut Self {
        self.coverage_estimator = coverage_estimator;
        self
    }

    pub fn set_gene_presence_threshold_fraction(&mut self, fraction: f64) -> &mut Self {
        self.gene_presence_threshold_fraction = fraction;
        self
    }

    pub fn set_min_species_abundance(&mut self, min_species_abundance: f64) -> &mut Self {
        self.min_species_abundance = min_species_abundance;
        self
    }

    pub fn set_min_site_depth(&mut self, min_site_depth: u32) -> &mut Self {
        self.min_site_depth = min_site_depth;
        self
    }

    pub fn set_min_allele_count(&mut self, min_allele_count: u32) -> &mut Self {
        self.min_allele_count = min_allele_count;
        self
    }

    pub fn set_nucleotide_tie_break_order(&mut self, order: TieBreakOrder) -> &mut Self {
        self.nucleotide_tie_break_order = order;
        self
    }

    pub fn set_threads(&mut self, threads: isize) -> &mut Self {
        self.threads = threads;
        self
    }

    pub fn set_batch_size(&mut self, batch_size: usize) -> &mut Self {
        self.batch_size = batch_size;
        self
    }
}
