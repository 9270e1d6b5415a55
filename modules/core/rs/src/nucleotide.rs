use std::fmt::Display;

#[cfg(feature = "bitcode")]
use bitcode::{Decode, Encode};
use derive_getters::Getters;
use eyre::{ensure, eyre, Report, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Observed base symbol for a deletion projected onto the reference.
pub const GAP: u8 = b'-';

#[cfg_attr(feature = "bitcode", derive(Encode, Decode))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Nucleotide {
    A,
    C,
    G,
    T,
}

impl Nucleotide {
    pub const ALL: [Nucleotide; 4] = [Nucleotide::A, Nucleotide::C, Nucleotide::G, Nucleotide::T];

    pub fn symbol(&self) -> char {
        match self {
            Nucleotide::A => 'A',
            Nucleotide::C => 'C',
            Nucleotide::G => 'G',
            Nucleotide::T => 'T',
        }
    }

    /// Case-insensitive parsing of a single ASCII base. Anything outside ACGT is not a nucleotide.
    pub fn from_ascii(base: u8) -> Option<Self> {
        match base {
            b'A' | b'a' => Some(Nucleotide::A),
            b'C' | b'c' => Some(Nucleotide::C),
            b'G' | b'g' => Some(Nucleotide::G),
            b'T' | b't' => Some(Nucleotide::T),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl Display for Nucleotide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl TryFrom<char> for Nucleotide {
    type Error = Report;

    fn try_from(value: char) -> Result<Self> {
        u8::try_from(value)
            .ok()
            .and_then(Nucleotide::from_ascii)
            .ok_or_else(|| eyre!("Invalid nucleotide: {value}"))
    }
}

/// Exact per-column observation counts. Depth is the sum of all buckets, including N and gaps.
#[cfg_attr(feature = "bitcode", derive(Encode, Decode))]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Getters)]
pub struct NucCounts {
    a: u32,
    c: u32,
    g: u32,
    t: u32,
    n: u32,
    gap: u32,
}

impl NucCounts {
    pub fn new(a: u32, c: u32, g: u32, t: u32, n: u32, gap: u32) -> Self {
        Self { a, c, g, t, n, gap }
    }

    /// Count one observed base. '-' is a gap, everything outside ACGT is an ambiguous N.
    pub fn add_ascii(&mut self, base: u8) {
        match Nucleotide::from_ascii(base) {
            Some(nuc) => *self.get_mut(nuc) += 1,
            None if base == GAP => self.gap += 1,
            None => self.n += 1,
        }
    }

    pub fn get(&self, nuc: Nucleotide) -> u32 {
        match nuc {
            Nucleotide::A => self.a,
            Nucleotide::C => self.c,
            Nucleotide::G => self.g,
            Nucleotide::T => self.t,
        }
    }

    fn get_mut(&mut self, nuc: Nucleotide) -> &mut u32 {
        match nuc {
            Nucleotide::A => &mut self.a,
            Nucleotide::C => &mut self.c,
            Nucleotide::G => &mut self.g,
            Nucleotide::T => &mut self.t,
        }
    }

    /// Sum of A, C, G and T observations.
    pub fn nucleotides(&self) -> u32 {
        self.a + self.c + self.g + self.t
    }

    /// Bases that were aligned to the column (everything except gaps).
    pub fn aligned(&self) -> u32 {
        self.nucleotides() + self.n
    }

    pub fn depth(&self) -> u32 {
        self.aligned() + self.gap
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    pub fn merge(&mut self, other: &Self) {
        self.a += other.a;
        self.c += other.c;
        self.g += other.g;
        self.t += other.t;
        self.n += other.n;
        self.gap += other.gap;
    }
}

/// Finalized pileup column. The depth is stored separately so that damaged columns can be detected
/// when the column comes from an untrusted source.
#[cfg_attr(feature = "bitcode", derive(Encode, Decode))]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Getters)]
pub struct PileupColumn {
    position: u32,
    counts: NucCounts,
    depth: u32,
}

impl PileupColumn {
    pub fn new(position: u32, counts: NucCounts, depth: u32) -> Self {
        Self { position, counts, depth }
    }

    pub fn from_counts(position: u32, counts: NucCounts) -> Self {
        Self {
            position,
            depth: counts.depth(),
            counts,
        }
    }

    /// Depth equals the sum of all observation buckets.
    pub fn is_consistent(&self) -> bool {
        self.depth == self.counts.depth()
    }
}

/// Precedence used to break ties between equally observed nucleotides. Must be a permutation of ACGT.
#[cfg_attr(feature = "bitcode", derive(Encode, Decode))]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TieBreakOrder([Nucleotide; 4]);

impl TieBreakOrder {
    pub fn new(order: [Nucleotide; 4]) -> Result<Self> {
        ensure!(
            order.iter().all_unique(),
            "Tie-break order must list each of A, C, G, T exactly once, got {order:?}"
        );
        Ok(Self(order))
    }

    pub fn order(&self) -> &[Nucleotide; 4] {
        &self.0
    }

    /// Lower rank wins a tie.
    pub fn rank(&self, nuc: Nucleotide) -> usize {
        // Constructed as a permutation, the lookup always succeeds
        self.0.iter().position(|x| *x == nuc).unwrap_or(usize::MAX)
    }

    /// Nucleotides ordered by decreasing count, ties resolved by the precedence order.
    pub fn ranked(&self, counts: &NucCounts) -> [Nucleotide; 4] {
        let mut ranked = self.0;
        // Stable sort keeps the precedence order among equal counts
        ranked.sort_by_key(|nuc| std::cmp::Reverse(counts.get(*nuc)));
        ranked
    }
}

impl Default for TieBreakOrder {
    fn default() -> Self {
        Self(Nucleotide::ALL)
    }
}

impl Display for TieBreakOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for nuc in &self.0 {
            write!(f, "{nuc}")?;
        }
        Ok(())
    }
}

impl TryFrom<&str> for TieBreakOrder {
    type Error = Report;

    fn try_from(value: &str) -> Result<Self> {
        let order: Vec<Nucleotide> = value.chars().map(Nucleotide::try_from).collect::<Result<_>>()?;
        let order: [Nucleotide; 4] = order
            .try_into()
            .map_err(|_| eyre!("Tie-break order must contain exactly 4 nucleotides, got {value}"))?;
        TieBreakOrder::new(order)
    }
}

impl TryFrom<String> for TieBreakOrder {
    type Error = Report;

    fn try_from(value: String) -> Result<Self> {
        TieBreakOrder::try_from(value.as_str())
    }
}

impl From<TieBreakOrder> for String {
    fn from(value: TieBreakOrder) -> Self {
        value.to_string()
    }
}
