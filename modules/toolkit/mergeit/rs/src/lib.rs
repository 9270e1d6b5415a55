pub use merger::{Merged, Merger, SpeciesMatrices, SpeciesMismatch};

pub mod matrix;
pub mod merger;
pub mod writer;
