use std::fmt::Display;

#[cfg(feature = "bitcode")]
use bitcode::{Decode, Encode};
use eyre::{eyre, Report, Result};
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "bitcode", derive(Encode, Decode))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(i8)]
pub enum Strand {
    /// The forward strand, also known as the positive strand or Watson strand.
    #[default]
    Forward = 1,
    /// The reverse strand, also known as the negative strand or Crick strand.
    Reverse = -1,
}

impl Strand {
    pub const ALL: [Strand; 2] = [Strand::Forward, Strand::Reverse];

    /// Get the symbolic representation of the strand.
    pub fn symbol(&self) -> char {
        match self {
            Self::Forward => '+',
            Self::Reverse => '-',
        }
    }

    /// Position of the strand in per-strand arrays.
    pub fn index(&self) -> usize {
        match self {
            Self::Forward => 0,
            Self::Reverse => 1,
        }
    }
}

impl Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl TryFrom<char> for Strand {
    type Error = Report;

    fn try_from(value: char) -> Result<Self> {
        match value {
            '+' => Ok(Self::Forward),
            '-' => Ok(Self::Reverse),
            _ => Err(eyre!("Invalid strand symbol: {value}")),
        }
    }
}

impl TryFrom<&str> for Strand {
    type Error = Report;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "+" => Ok(Self::Forward),
            "-" => Ok(Self::Reverse),
            _ => Err(eyre!("Invalid strand symbol: {value}")),
        }
    }
}

impl TryFrom<String> for Strand {
    type Error = Report;

    fn try_from(value: String) -> Result<Self> {
        Strand::try_from(value.as_str())
    }
}

impl From<Strand> for String {
    fn from(value: Strand) -> Self {
        value.symbol().to_string()
    }
}
