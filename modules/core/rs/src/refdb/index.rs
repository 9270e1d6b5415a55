use std::collections::BTreeMap;

use ahash::AHashMap;
use derive_getters::Getters;
use eyre::{ensure, eyre, Result};
use itertools::Itertools;

use super::{DatabaseStamp, GeneLocation, Species, Target, TargetKind};
use crate::error::Error;
use crate::fingerprint::Fnv1a;
use crate::loc::{Interval, IntervalOp};

/// Immutable, loaded-once view of the reference database.
#[derive(Clone, Debug, Getters)]
pub struct ReferenceIndex {
    stamp: DatabaseStamp,
    targets: Vec<Target>,
    species: Vec<Species>,
    #[getter(skip)]
    targets_by_name: AHashMap<String, usize>,
    #[getter(skip)]
    species_by_name: AHashMap<String, usize>,
}

impl ReferenceIndex {
    pub fn builder(stamp: DatabaseStamp) -> ReferenceIndexBuilder {
        ReferenceIndexBuilder::new(stamp)
    }

    pub fn target(&self, id: usize) -> &Target {
        &self.targets[id]
    }

    /// Resolve a target name. Unknown names are reported as [`Error::MissingReferenceEntry`].
    pub fn target_by_name(&self, name: &str) -> Result<usize> {
        self.targets_by_name.get(name).copied().ok_or_else(|| {
            Error::MissingReferenceEntry {
                target: name.to_string(),
            }
            .into()
        })
    }

    /// Cheap lookup for hot paths where a missing target is not an error.
    pub fn find_target(&self, name: &str) -> Option<usize> {
        self.targets_by_name.get(name).copied()
    }

    pub fn species_of(&self, target: usize) -> &Species {
        &self.species[*self.targets[target].species()]
    }

    pub fn species_by_name(&self, name: &str) -> Option<&Species> {
        self.species_by_name.get(name).map(|x| &self.species[*x])
    }

    pub fn species_id(&self, name: &str) -> Option<usize> {
        self.species_by_name.get(name).copied()
    }
}

#[derive(Clone, Debug)]
struct PendingTarget {
    species: String,
    name: String,
    kind: TargetKind,
    length: u32,
    location: Option<(String, Interval<u32>)>,
}

/// Collects raw database entries and validates them into a [`ReferenceIndex`].
#[derive(Clone, Debug)]
pub struct ReferenceIndexBuilder {
    stamp: DatabaseStamp,
    pending: Vec<PendingTarget>,
}

impl ReferenceIndexBuilder {
    pub fn new(stamp: DatabaseStamp) -> Self {
        Self {
            stamp,
            pending: Vec::new(),
        }
    }

    pub fn add_target(
        &mut self,
        species: impl Into<String>,
        name: impl Into<String>,
        kind: TargetKind,
        length: u32,
    ) -> &mut Self {
        self.pending.push(PendingTarget {
            species: species.into(),
            name: name.into(),
            kind,
            length,
            location: None,
        });
        self
    }

    /// Pangenome gene placed on a representative contig of the same species.
    pub fn add_located_gene(
        &mut self,
        species: impl Into<String>,
        name: impl Into<String>,
        length: u32,
        contig: impl Into<String>,
        interval: Interval<u32>,
    ) -> &mut Self {
        self.pending.push(PendingTarget {
            species: species.into(),
            name: name.into(),
            kind: TargetKind::Gene,
            length,
            location: Some((contig.into(), interval)),
        });
        self
    }

    pub fn build(self) -> Result<ReferenceIndex> {
        ensure!(
            !self.pending.is_empty(),
            "Reference database {} doesn't contain any targets",
            self.stamp
        );
        unique_names(self.pending.iter().map(|x| x.name.as_str()))?;

        // Species are ordered by name, targets keep the insertion order
        let mut species: BTreeMap<&str, Species> = BTreeMap::new();
        for target in &self.pending {
            ensure!(!target.species.is_empty(), "Target {} has an empty species id", target.name);
            ensure!(target.length > 0, "Target {} must have a positive length", target.name);
            species
                .entry(target.species.as_str())
                .or_insert_with(|| Species::new(target.species.clone()));
        }
        let species_ids: AHashMap<&str, usize> = species.keys().enumerate().map(|(ind, name)| (*name, ind)).collect();
        let targets_by_name: AHashMap<String, usize> = self
            .pending
            .iter()
            .enumerate()
            .map(|(ind, x)| (x.name.clone(), ind))
            .collect();

        let mut targets = Vec::with_capacity(self.pending.len());
        for (ind, pending) in self.pending.iter().enumerate() {
            let location = match &pending.location {
                None => None,
                Some((contig, interval)) => Some(locate(pending, contig, *interval, &self.pending, &targets_by_name)?),
            };
            species
                .get_mut(pending.species.as_str())
                .ok_or_else(|| eyre!("Unregistered species {}", pending.species))?
                .push(pending.kind, ind);
            targets.push(Target::new(
                pending.name.clone(),
                species_ids[pending.species.as_str()],
                pending.kind,
                pending.length,
                location,
            ));
        }

        let mut species: Vec<Species> = species.into_values().collect();
        for sp in species.iter_mut() {
            let fingerprint = fingerprint(sp, &targets);
            sp.set_fingerprint(fingerprint);
        }
        let species_by_name = species
            .iter()
            .enumerate()
            .map(|(ind, x)| (x.name().clone(), ind))
            .collect();

        Ok(ReferenceIndex {
            stamp: self.stamp,
            targets,
            species,
            targets_by_name,
            species_by_name,
        })
    }
}

fn unique_names<'a>(names: impl Iterator<Item = &'a str>) -> Result<()> {
    let duplicates = names.duplicates().take(10).collect_vec();
    ensure!(
        duplicates.is_empty(),
        "Target names must be unique, duplicated: {}",
        duplicates.join(", ")
    );
    Ok(())
}

fn locate(
    gene: &PendingTarget,
    contig: &str,
    interval: Interval<u32>,
    pending: &[PendingTarget],
    targets_by_name: &AHashMap<String, usize>,
) -> Result<GeneLocation> {
    let corrupted = |reason: String| Error::CorruptDatabaseIndex {
        target: gene.name.clone(),
        reason,
    };

    let ind = *targets_by_name
        .get(contig)
        .ok_or_else(|| corrupted(format!("located on unknown contig {contig}")))?;
    let host = &pending[ind];
    if host.kind != TargetKind::Contig {
        return Err(corrupted(format!("located on {contig}, which is a {}", host.kind)).into());
    }
    if host.species != gene.species {
        return Err(corrupted(format!("located on {contig} of another species ({})", host.species)).into());
    }
    if interval.end() > host.length {
        return Err(corrupted(format!(
            "location {interval} runs past the end of {contig} (length {})",
            host.length
        ))
        .into());
    }
    Ok(GeneLocation::new(ind, interval))
}

fn fingerprint(species: &Species, targets: &[Target]) -> u64 {
    let mut hasher = Fnv1a::new();
    hasher.write_str(species.name());

    let sorted = species.targets().map(|x| &targets[x]).sorted_by(|a, b| a.name().cmp(b.name()));
    for target in sorted {
        hasher
            .write_str(target.name())
            .write_str(target.kind().symbol())
            .write_u64(*target.length() as u64);
        if let Some(location) = target.location() {
            hasher
                .write_str(targets[*location.contig()].name())
                .write_u64(location.interval().start() as u64)
                .write_u64(location.interval().end() as u64);
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> DatabaseStamp {
        DatabaseStamp::new("testdb".to_string(), "1".to_string())
    }

    fn builder() -> ReferenceIndexBuilder {
        let mut builder = ReferenceIndex::builder(stamp());
        builder
            .add_target("sp2", "sp2_contig", TargetKind::Contig, 500)
            .add_target("sp1", "sp1_contig", TargetKind::Contig, 1000)
            .add_target("sp1", "sp1_marker", TargetKind::Marker, 100)
            .add_located_gene("sp1", "sp1_gene", 100, "sp1_contig", Interval::new(100, 200).unwrap());
        builder
    }

    #[test]
    fn test_build() -> Result<()> {
        let index = builder().build()?;
        assert_eq!(index.targets().len(), 4);
        assert_eq!(index.species().len(), 2);

        // Species are sorted by name
        assert_eq!(index.species()[0].name(), "sp1");
        assert_eq!(index.species()[1].name(), "sp2");

        let gene = index.target_by_name("sp1_gene")?;
        assert_eq!(*index.target(gene).kind(), TargetKind::Gene);
        assert_eq!(index.species_of(gene).name(), "sp1");
        let location = index.target(gene).location().unwrap();
        assert_eq!(*location.contig(), index.target_by_name("sp1_contig")?);

        let sp1 = index.species_by_name("sp1").unwrap();
        assert_eq!(sp1.contigs(), &vec![1]);
        assert_eq!(sp1.markers(), &vec![2]);
        assert_eq!(sp1.genes(), &vec![3]);
        Ok(())
    }

    #[test]
    fn test_missing_target() {
        let index = builder().build().unwrap();
        let err = index.target_by_name("unknown").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MissingReferenceEntry { .. })
        ));
        assert_eq!(index.find_target("unknown"), None);
    }

    #[test]
    fn test_invalid_databases() {
        let mut dup = builder();
        dup.add_target("sp3", "sp1_marker", TargetKind::Marker, 10);
        assert!(dup.build().is_err());

        let mut empty = builder();
        empty.add_target("sp3", "sp3_marker", TargetKind::Marker, 0);
        assert!(empty.build().is_err());

        let mut foreign = builder();
        foreign.add_located_gene("sp2", "sp2_gene", 10, "sp1_contig", Interval::new(0, 10).unwrap());
        assert!(foreign.build().is_err());

        let mut outside = builder();
        outside.add_located_gene("sp1", "sp1_gene_2", 10, "sp1_contig", Interval::new(995, 1005).unwrap());
        let err = outside.build().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::CorruptDatabaseIndex { .. })
        ));

        assert!(ReferenceIndex::builder(stamp()).build().is_err());
    }

    #[test]
    fn test_fingerprint() -> Result<()> {
        let first = builder().build()?;
        let second = builder().build()?;
        assert_eq!(
            first.species_by_name("sp1").unwrap().fingerprint(),
            second.species_by_name("sp1").unwrap().fingerprint()
        );

        let mut changed = builder();
        changed.add_target("sp1", "sp1_marker_2", TargetKind::Marker, 100);
        let changed = changed.build()?;
        assert_ne!(
            first.species_by_name("sp1").unwrap().fingerprint(),
            changed.species_by_name("sp1").unwrap().fingerprint()
        );
        assert_eq!(
            first.species_by_name("sp2").unwrap().fingerprint(),
            changed.species_by_name("sp2").unwrap().fingerprint()
        );
        Ok(())
    }
}
