//! Reference database manifest.
//!
//! Tab-separated, optionally gzip-compressed. Lines starting with `#` are comments, except for
//! `#name=<value>` and `#version=<value>` which stamp the database. An optional header row starts
//! with `species`. Every other line describes one target:
//!
//! ```text
//! species  target  kind  length  [contig  start  end]
//! ```
//!
//! `kind` is one of `contig`, `gene`, `marker`. The trailing placement columns are only meaningful
//! for genes and may be `.` when the gene is not placed on a contig.

use std::io::BufRead;
use std::path::Path;

use eyre::{bail, ensure, OptionExt, Result, WrapErr};
use metabit_core_rs::loc::Interval;
use metabit_core_rs::refdb::{DatabaseStamp, ReferenceIndex, ReferenceIndexBuilder, TargetKind};

use crate::compression;

pub mod parse {
    use super::*;

    pub fn field<'a>(parts: &mut impl Iterator<Item = &'a str>, name: &str) -> Result<&'a str> {
        let value = parts.next().ok_or_else(|| eyre::eyre!("Missing manifest {name}"))?;
        ensure!(!value.is_empty(), "Empty manifest {name}");
        Ok(value)
    }

    pub fn kind<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<TargetKind> {
        TargetKind::try_from(field(parts, "kind")?)
    }

    pub fn length<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<u32> {
        let length = field(parts, "length")?;
        let length = length.parse::<u32>().wrap_err("Invalid manifest length")?;
        ensure!(length > 0, "Target length must be positive");
        Ok(length)
    }

    /// Optional `contig start end` triple. `.` in all three columns means no placement.
    pub fn placement<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<Option<(String, Interval<u32>)>> {
        let contig = match parts.next() {
            None | Some(".") => {
                for column in ["start", "end"] {
                    match parts.next() {
                        None | Some(".") => {}
                        Some(_) => bail!("Manifest {column} is given without a contig"),
                    }
                }
                return Ok(None);
            }
            Some(contig) => contig,
        };
        let start = parts.next().ok_or_eyre("Missing manifest start")?;
        let end = parts.next().ok_or_eyre("Missing manifest end")?;
        let (start, end) = match (start.parse::<u32>(), end.parse::<u32>()) {
            (Ok(start), Ok(end)) => (start, end),
            _ => bail!("Invalid manifest placement: {start}-{end}"),
        };
        let interval = Interval::new(start, end).wrap_err("Invalid manifest placement")?;
        Ok(Some((contig.to_owned(), interval)))
    }

    pub fn target<'a>(parts: &mut impl Iterator<Item = &'a str>, into: &mut ReferenceIndexBuilder) -> Result<()> {
        let species = field(parts, "species")?;
        let name = field(parts, "target")?;
        let kind = kind(parts)?;
        let length = length(parts)?;

        match (kind, placement(parts)?) {
            (_, None) => {
                into.add_target(species, name, kind, length);
            }
            (TargetKind::Gene, Some((contig, interval))) => {
                into.add_located_gene(species, name, length, contig, interval);
            }
            (kind, Some(_)) => bail!("Only genes can be placed on a contig, got a {kind}"),
        }
        Ok(())
    }
}

/// Read a manifest from any buffered source.
pub fn read(mut reader: impl BufRead) -> Result<ReferenceIndex> {
    let mut name = None;
    let mut version = None;
    let mut pending = Vec::new();

    let mut buffer = String::new();
    let mut lineno = 0;
    loop {
        buffer.clear();
        if reader.read_line(&mut buffer)? == 0 {
            break;
        }
        lineno += 1;

        let line = buffer.trim_end_matches(['\n', '\r']);
        if line.is_empty() || line.starts_with("species\t") {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            if let Some(value) = comment.strip_prefix("name=") {
                name = Some(value.trim().to_owned());
            } else if let Some(value) = comment.strip_prefix("version=") {
                version = Some(value.trim().to_owned());
            }
            continue;
        }
        pending.push((lineno, line.to_owned()));
    }

    let stamp = DatabaseStamp::new(
        name.ok_or_eyre("Manifest doesn't declare the database name (#name=...)")?,
        version.ok_or_eyre("Manifest doesn't declare the database version (#version=...)")?,
    );
    let mut builder = ReferenceIndex::builder(stamp);
    for (lineno, line) in pending {
        let mut parts = line.split('\t');
        parse::target(&mut parts, &mut builder)
            .wrap_err_with(|| format!("Failed to parse manifest line {lineno}: {line}"))?;
        ensure!(
            parts.next().is_none(),
            "Manifest line {lineno} has too many fields: {line}"
        );
    }

    let index = builder.build()?;
    log::info!(
        "Loaded reference database {}: {} species, {} targets",
        index.stamp(),
        index.species().len(),
        index.targets().len()
    );
    Ok(index)
}

/// Read a manifest file. The compression is detected from the file signature.
pub fn from_path(path: impl AsRef<Path>) -> Result<ReferenceIndex> {
    let path = path.as_ref();
    let reader = compression::read_file(path)?.box_bufread();
    read(reader).wrap_err_with(|| format!("Failed to load reference manifest {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "#name=testdb\n\
        #version=2024.1\n\
        # free-form comment\n\
        species\ttarget\tkind\tlength\tcontig\tstart\tend\n\
        sp1\tsp1_contig\tcontig\t1000\t.\t.\t.\n\
        sp1\tsp1_marker\tmarker\t100\n\
        sp1\tsp1_gene\tgene\t100\tsp1_contig\t100\t200\n\
        sp2\tsp2_gene\tgene\t50\t.\t.\t.\n";

    #[test]
    fn test_read() -> Result<()> {
        let index = read(MANIFEST.as_bytes())?;
        assert_eq!(index.stamp().name(), "testdb");
        assert_eq!(index.stamp().version(), "2024.1");
        assert_eq!(index.targets().len(), 4);
        assert_eq!(index.species().len(), 2);

        let gene = index.target(index.target_by_name("sp1_gene")?);
        let location = gene.location().ok_or_eyre("gene must be placed")?;
        assert_eq!(*location.interval(), Interval::new(100, 200)?);
        assert!(index.target(index.target_by_name("sp2_gene")?).location().is_none());
        Ok(())
    }

    #[test]
    fn test_invalid_lines() {
        for line in [
            "sp1\tt\tplasmid\t10",
            "sp1\tt\tgene\t-10",
            "sp1\tt\tgene\t0",
            "sp1\tt\tgene",
            "sp1\tt\tmarker\t10\tsp1_contig\t0\t10",
            "sp1\tt\tgene\t10\tsp1_contig\t10\t5",
            "sp1\tt\tgene\t10\t.\t1\t.",
            "sp1\tt\tgene\t10\t.\t.\t.\textra",
        ] {
            let manifest = format!("#name=db\n#version=1\nsp1\tsp1_contig\tcontig\t100\n{line}\n");
            assert!(read(manifest.as_bytes()).is_err(), "{line}");
        }
    }

    #[test]
    fn test_missing_stamp() {
        assert!(read("sp1\tt\tmarker\t10\n".as_bytes()).is_err());
        assert!(read("#name=db\nsp1\tt\tmarker\t10\n".as_bytes()).is_err());
    }

    #[test]
    fn test_from_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("manifest.tsv.gz");
        let mut stream = compression::create_file(&path)?;
        std::io::Write::write_all(&mut stream, MANIFEST.as_bytes())?;
        stream.finish()?;

        let index = from_path(&path)?;
        assert_eq!(index.targets().len(), 4);
        Ok(())
    }
}
