//! Persisted per-sample profiles.
//!
//! The binary artifact is the only input of the cross-sample merger. It is written to a temporary
//! sibling file and renamed into place, so a partially written artifact is never observed under
//! its final name.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{ensure, eyre, Result, WrapErr};
use metabit_io_rs::tsv::{self, TsvRecord, Writer};
use metabit_io_rs::WriteRecord;

use crate::abundance::SpeciesAbundance;
use crate::pangenome::GeneCall;
use crate::result::SampleProfile;
use crate::variants::SiteCall;

const MAGIC: &[u8; 8] = b"MTBTPRF2";

pub const SPECIES_HEADER: [&str; 4] = [
    "species_id",
    "genome_equivalent_coverage",
    "relative_abundance",
    "marker_gene_count_covered",
];

pub const GENES_HEADER: [&str; 5] = ["species_id", "gene_id", "coverage", "presence", "copy_number"];

pub const SITES_HEADER: [&str; 8] = [
    "target_id",
    "position",
    "consensus",
    "alt",
    "depth",
    "consensus_frequency",
    "alt_frequency",
    "quality_flag",
];

pub fn encode(profile: &SampleProfile) -> Vec<u8> {
    let mut bytes = MAGIC.to_vec();
    bytes.extend(bitcode::encode(profile));
    bytes
}

pub fn decode(bytes: &[u8]) -> Result<SampleProfile> {
    ensure!(
        bytes.len() >= MAGIC.len() && &bytes[..MAGIC.len()] == MAGIC,
        "Not a sample profile artifact"
    );
    bitcode::decode(&bytes[MAGIC.len()..]).map_err(|err| eyre!("Corrupted sample profile: {err}"))
}

fn partial(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|x| x.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Atomically write the profile artifact.
pub fn save(profile: &SampleProfile, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let tmp = partial(path);
    fs::write(&tmp, encode(profile))
        .wrap_err_with(|| format!("Failed to write sample artifact {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .wrap_err_with(|| format!("Failed to move sample artifact into {}", path.display()))?;
    log::debug!("Sample {} saved to {}", profile.sample(), path.display());
    Ok(())
}

pub fn load(path: impl AsRef<Path>) -> Result<SampleProfile> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .wrap_err_with(|| format!("Failed to read sample artifact {}", path.display()))?;
    decode(&bytes).wrap_err_with(|| format!("Invalid sample artifact {}", path.display()))
}

struct SpeciesRow<'a>(&'a str, &'a SpeciesAbundance);

impl TsvRecord for SpeciesRow<'_> {
    fn fields(&self) -> Vec<String> {
        vec![
            self.0.to_string(),
            tsv::float(*self.1.genome_coverage()),
            tsv::float(*self.1.relative_abundance()),
            self.1.markers_covered().to_string(),
        ]
    }
}

struct GeneRow<'a>(&'a str, &'a GeneCall);

impl TsvRecord for GeneRow<'_> {
    fn fields(&self) -> Vec<String> {
        let presence = self.1.presence().map(|x| if x { "1" } else { "0" });
        vec![
            self.0.to_string(),
            self.1.gene().clone(),
            tsv::float(*self.1.coverage()),
            tsv::optional(presence),
            tsv::optional_float(*self.1.copy_number()),
        ]
    }
}

struct SiteRow<'a>(&'a str, &'a SiteCall);

impl TsvRecord for SiteRow<'_> {
    fn fields(&self) -> Vec<String> {
        let call = self.1;
        vec![
            self.0.to_string(),
            call.position().to_string(),
            tsv::optional(*call.consensus()),
            tsv::optional(*call.alt()),
            call.depth().to_string(),
            tsv::optional_float(call.consensus_frequency()),
            tsv::optional_float(call.alt_frequency()),
            call.flag().to_string(),
        ]
    }
}

/// Write the species, gene and site tables of the profile into `directory`. File names are
/// prefixed by the sample id, `suffix` (e.g. `.tsv.gz`) selects the compression.
pub fn export(profile: &SampleProfile, directory: impl AsRef<Path>, suffix: &str) -> Result<()> {
    let directory = directory.as_ref();
    fs::create_dir_all(directory)
        .wrap_err_with(|| format!("Failed to create {}", directory.display()))?;
    let file = |table: &str| directory.join(format!("{}.{table}{suffix}", profile.sample()));

    let mut writer = Writer::from_path(file("species"), &SPECIES_HEADER)?;
    for (species, abundance) in profile.detected() {
        writer.write_record(&SpeciesRow(species, abundance))?;
    }
    writer.finish()?;

    let mut writer = Writer::from_path(file("genes"), &GENES_HEADER)?;
    for report in profile.species() {
        for gene in report.genes() {
            writer.write_record(&GeneRow(report.species(), gene))?;
        }
    }
    writer.finish()?;

    let mut writer = Writer::from_path(file("sites"), &SITES_HEADER)?;
    for report in profile.species() {
        for sites in report.sites() {
            for call in sites.calls() {
                writer.write_record(&SiteRow(sites.target(), call))?;
            }
        }
    }
    writer.finish()?;

    log::info!("Sample {} exported to {}", profile.sample(), directory.display());
    Ok(())
}
