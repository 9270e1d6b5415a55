use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Local;
use eyre::{Result, WrapErr};
use metabit_core_rs::refdb::DatabaseStamp;
use metabit_io_rs::tsv::Writer;
use metabit_io_rs::WriteRecord;
use serde::Serialize;

use crate::matrix::{Cell, Matrix};
use crate::merger::Merged;

pub const MANIFEST: &str = "manifest.json";

#[derive(Serialize)]
struct Mismatch<'a> {
    species: &'a str,
    reason: &'a str,
}

/// Provenance of a merge run.
#[derive(Serialize)]
struct Manifest<'a> {
    database: &'a DatabaseStamp,
    merged_at: String,
    samples: &'a [String],
    species: Vec<&'a str>,
    mismatches: Vec<Mismatch<'a>>,
}

fn write_matrix<T: Cell>(matrix: &Matrix<T>, path: &Path) -> Result<()> {
    let mut writer = Writer::from_path(path, &matrix.header())?;
    for row in matrix.rows() {
        writer.write_record(row)?;
    }
    writer.finish()
}

/// Write all merged matrices into `directory`, one subdirectory per species, plus the JSON merge
/// manifest. `suffix` (e.g. `.tsv` or `.tsv.gz`) selects the compression of the matrices.
pub fn write(merged: &Merged, directory: impl AsRef<Path>, suffix: &str) -> Result<()> {
    let directory = directory.as_ref();
    fs::create_dir_all(directory)
        .wrap_err_with(|| format!("Failed to create {}", directory.display()))?;

    write_matrix(
        merged.relative_abundance(),
        &directory.join(format!("relative_abundance{suffix}")),
    )?;
    write_matrix(
        merged.genome_coverage(),
        &directory.join(format!("genome_coverage{suffix}")),
    )?;

    for species in merged.species() {
        let folder = directory.join(species.species());
        fs::create_dir_all(&folder)
            .wrap_err_with(|| format!("Failed to create {}", folder.display()))?;
        let file = |name: &str| folder.join(format!("{name}{suffix}"));

        write_matrix(species.gene_coverage(), &file("genes_coverage"))?;
        write_matrix(species.gene_copy_number(), &file("genes_copy_number"))?;
        write_matrix(species.gene_presence(), &file("genes_presence"))?;
        write_matrix(species.site_depth(), &file("sites_depth"))?;
        write_matrix(species.site_minor_frequency(), &file("sites_minor_frequency"))?;
    }

    let manifest = Manifest {
        database: merged.database(),
        merged_at: Local::now().to_rfc3339(),
        samples: merged.samples(),
        species: merged.species().iter().map(|x| x.species().as_str()).collect(),
        mismatches: merged
            .mismatches()
            .iter()
            .map(|x| Mismatch {
                species: x.species(),
                reason: x.reason(),
            })
            .collect(),
    };
    let path = directory.join(MANIFEST);
    let file = File::create(&path).wrap_err_with(|| format!("Failed to create {}", path.display()))?;
    let mut stream = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut stream, &manifest)
        .wrap_err_with(|| format!("Failed to write merge manifest {}", path.display()))?;
    stream.flush()?;

    log::info!(
        "Merged {} samples and {} species into {}",
        merged.samples().len(),
        merged.species().len(),
        directory.display()
    );
    Ok(())
}
