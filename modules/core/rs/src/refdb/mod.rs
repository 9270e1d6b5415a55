pub use index::{ReferenceIndex, ReferenceIndexBuilder};
pub use species::Species;
pub use stamp::DatabaseStamp;
pub use target::{GeneLocation, Target, TargetKind};

mod index;
mod species;
mod stamp;
mod target;
