use std::fmt::Display;

#[cfg(feature = "bitcode")]
use bitcode::{Decode, Encode};
use derive_getters::{Dissolve, Getters};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};

/// Identity of the reference database a sample was profiled against.
#[cfg_attr(feature = "bitcode", derive(Encode, Decode))]
#[derive(
    Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Constructor, Getters, Dissolve, Serialize, Deserialize,
)]
pub struct DatabaseStamp {
    name: String,
    version: String,
}

impl Display for DatabaseStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}
