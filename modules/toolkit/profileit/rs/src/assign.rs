//! Best-hit assignment of multi-mapped reads.

use std::collections::BTreeMap;

use ahash::AHashMap;
use metabit_core_rs::fingerprint::{fnv1a, unit_interval};
use metabit_core_rs::record::{AlignmentRecord, Segment};
use metabit_core_rs::refdb::ReferenceIndex;

use crate::abundance::SpeciesAbundance;

#[derive(Debug, Clone, PartialEq)]
struct Hit {
    target: usize,
    species: usize,
    score: i64,
    record: AlignmentRecord,
}

impl Hit {
    // Deterministic preference among equally scored hits, independent of the arrival order
    fn key(&self) -> (u32, &[u8]) {
        (*self.record.start(), self.record.bases())
    }
}

/// Mates of one fragment aligned to the same target.
#[derive(Debug, Clone, PartialEq)]
struct Fragment {
    target: usize,
    species: usize,
    hits: Vec<Hit>,
}

impl Fragment {
    /// Keep the best alignment of every mate on `target`.
    fn new(target: usize, hits: Vec<Hit>) -> Option<Self> {
        let mut mates: BTreeMap<Segment, Hit> = BTreeMap::new();
        for hit in hits {
            match mates.get(hit.record.segment()) {
                Some(existing)
                    if existing.score > hit.score
                        || (existing.score == hit.score && existing.key() <= hit.key()) => {}
                _ => {
                    mates.insert(*hit.record.segment(), hit);
                }
            }
        }
        let species = mates.values().next()?.species;
        Some(Self {
            target,
            species,
            hits: mates.into_values().collect(),
        })
    }

    /// Paired reads are scored jointly.
    fn score(&self) -> i64 {
        self.hits.iter().map(|x| x.score).sum()
    }

    fn key(&self) -> (usize, Vec<(u32, &[u8])>) {
        (self.target, self.hits.iter().map(|x| x.key()).collect())
    }
}

/// Outcome of resolving all buffered reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    /// Winning (target, record) pairs, every mate of the winning fragment is kept.
    pub hits: Vec<(usize, AlignmentRecord)>,
    /// Alignments that lost against the best hit of their fragment.
    pub discarded: u64,
    /// Fragments whose best score was shared by several species.
    pub ambiguous: u64,
}

/// Buffers accepted contig and gene alignments per fragment (read name) until species abundances
/// are known.
#[derive(Debug, Clone, Default)]
pub struct ReadAssigner {
    reads: AHashMap<String, Vec<Hit>>,
}

impl ReadAssigner {
    pub fn clear(&mut self) {
        self.reads.clear();
    }

    pub fn add(&mut self, index: &ReferenceIndex, target: usize, record: AlignmentRecord) {
        let hit = Hit {
            target,
            species: *index.target(target).species(),
            score: record.score(),
            record,
        };
        match self.reads.get_mut(hit.record.read()) {
            Some(hits) => hits.push(hit),
            None => {
                self.reads.insert(hit.record.read().clone(), vec![hit]);
            }
        }
    }

    pub fn merge(&mut self, other: &mut ReadAssigner) {
        for (read, hits) in other.reads.drain() {
            self.reads.entry(read).or_default().extend(hits);
        }
    }

    /// Keep a single best-scoring target per fragment together with the alignments of all its
    /// mates on that target. A fragment is scored as the sum of its mates' best alignments.
    ///
    /// When the best score is shared by several species, the fragment goes to one of them with a
    /// probability proportional to the species' relative abundance. The draw is a hash of the read
    /// name, so the outcome doesn't depend on the thread count or record order. Species without
    /// abundance are only picked (smallest id first) when none of the candidates has one.
    pub fn resolve(self, abundance: &BTreeMap<usize, SpeciesAbundance>) -> Assignment {
        let mut result = Assignment::default();
        for (read, hits) in self.reads {
            let total = hits.len() as u64;

            let mut targets: BTreeMap<usize, Vec<Hit>> = BTreeMap::new();
            for hit in hits {
                targets.entry(hit.target).or_default().push(hit);
            }
            let fragments: Vec<Fragment> = targets
                .into_iter()
                .filter_map(|(target, hits)| Fragment::new(target, hits))
                .collect();
            let best = fragments.iter().map(|x| x.score()).max().unwrap_or(i64::MIN);

            // Best fragment per species
            let mut candidates: BTreeMap<usize, Fragment> = BTreeMap::new();
            for fragment in fragments.into_iter().filter(|x| x.score() == best) {
                match candidates.get(&fragment.species) {
                    Some(existing) if existing.key() <= fragment.key() => {}
                    _ => {
                        candidates.insert(fragment.species, fragment);
                    }
                }
            }

            if candidates.len() > 1 {
                result.ambiguous += 1;
            }
            let species = choose(&read, candidates.keys().copied(), abundance);
            if let Some(fragment) = species.and_then(|x| candidates.remove(&x)) {
                result.discarded += total - fragment.hits.len() as u64;
                result
                    .hits
                    .extend(fragment.hits.into_iter().map(|x| (x.target, x.record)));
            }
        }
        // Hash map iteration order is arbitrary
        result.hits.sort_by(|a, b| {
            (a.1.read(), a.0, *a.1.segment(), *a.1.start()).cmp(&(
                b.1.read(),
                b.0,
                *b.1.segment(),
                *b.1.start(),
            ))
        });
        result
    }
}

fn choose(
    read: &str,
    candidates: impl Iterator<Item = usize> + Clone,
    abundance: &BTreeMap<usize, SpeciesAbundance>,
) -> Option<usize> {
    let weight = |species: &usize| {
        abundance
            .get(species)
            .map(|x| *x.relative_abundance())
            .unwrap_or(0.0)
    };
    let total: f64 = candidates.clone().map(|x| weight(&x)).sum();
    if total <= 0.0 {
        return candidates.min();
    }

    let mut draw = unit_interval(fnv1a(read.as_bytes())) * total;
    let mut last = None;
    for species in candidates {
        let weight = weight(&species);
        if weight <= 0.0 {
            continue;
        }
        if draw < weight {
            return Some(species);
        }
        draw -= weight;
        last = Some(species);
    }
    // Rounding may push the draw past the last bucket
    last
}
