pub mod bam;
pub mod compression;
pub mod manifest;
pub mod tsv;
mod traits;

pub use traits::WriteRecord;
