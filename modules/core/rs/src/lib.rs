pub mod error;
pub mod fingerprint;
pub mod loc;
pub mod nucleotide;
pub mod num;
pub mod parallelism;
pub mod record;
pub mod refdb;

pub use error::Error;
