pub use config::{Config, CoverageEstimator, MultimapPolicy};
pub use engine::Engine;
pub use result::{Diagnostics, SampleProfile, SpeciesReport, TargetSites};

pub mod abundance;
pub mod aggregate;
pub mod artifact;
mod assign;
pub mod config;
mod engine;
pub mod filter;
mod layout;
pub mod pangenome;
pub mod result;
pub mod variants;
mod worker;
