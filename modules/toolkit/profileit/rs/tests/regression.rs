use std::path::{Path, PathBuf};

use eyre::{ensure, eyre, OptionExt, Result};
use metabit_core_rs::loc::Strand;
use metabit_core_rs::nucleotide::Nucleotide;
use metabit_core_rs::record::{AlignmentRecord, Segment};
use metabit_core_rs::refdb::ReferenceIndex;
use metabit_io_rs::{compression, manifest};
use metabit_profileit_rs::filter::RejectReason;
use metabit_profileit_rs::variants::QualityFlag;
use metabit_profileit_rs::{artifact, Config, Engine, MultimapPolicy, SampleProfile};

const EPSILON: f64 = 1e-6;

pub fn get_resource_path(resource: impl AsRef<Path>) -> Result<PathBuf> {
    let resource = resource.as_ref();
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(|x| x.join("resources"))
        .map(|x| x.join(resource))
        .ok_or_else(|| {
            eyre!(
                "Failed to locate requested resource: {}",
                resource.display()
            )
        })?;
    ensure!(
        path.exists(),
        "Requested resource does not exist: {}",
        path.display()
    );
    Ok(path)
}

fn reference() -> Result<ReferenceIndex> {
    manifest::from_path(get_resource_path("reference.tsv")?)
}

fn read(name: String, target: &str, start: u32, bases: &[u8], mapq: u8, edit_distance: u32) -> AlignmentRecord {
    AlignmentRecord::new(
        name,
        target,
        start,
        Strand::Forward,
        mapq,
        edit_distance,
        bases.to_vec(),
        vec![40; bases.len()],
    )
}

/// Synthetic sample:
/// * sp_a markers at 10x, 8x and 12x; sp_b marker at 3x
/// * 10 reads over a_contig:480-530, 3 of them carry G at position 500
/// * 5 reads over a_contig:100-200, the location of a_g1
/// * 2 short reads directly on b_g1
/// * 3 records that must be rejected
fn records() -> Vec<AlignmentRecord> {
    let mut records = Vec::new();
    for (marker, reads) in [("a_m1", 100), ("a_m2", 80), ("a_m3", 120), ("b_m1", 30)] {
        for ind in 0..reads {
            let start = (ind * 9) % 900;
            records.push(read(format!("{marker}_{ind}"), marker, start, &[b'A'; 100], 60, 0));
        }
    }

    for ind in 0..10 {
        let mut bases = [b'A'; 50];
        if ind < 3 {
            bases[20] = b'G';
        }
        records.push(read(format!("snv_{ind}"), "a_contig", 480, &bases, 60, (ind < 3) as u32));
    }
    for ind in 0..5 {
        records.push(read(format!("gene_{ind}"), "a_contig", 100, &[b'C'; 100], 60, 0));
    }
    for ind in 0..2 {
        records.push(read(format!("b_gene_{ind}"), "b_g1", 25, &[b'T'; 50], 60, 0));
    }

    records.push(read("unknown".into(), "missing_contig", 0, &[b'A'; 100], 60, 0));
    records.push(read("low_mapq".into(), "a_contig", 0, &[b'A'; 100], 5, 0));
    records.push(read("short".into(), "a_contig", 0, &[b'A'; 10], 60, 0));
    records
}

fn config() -> Config {
    let mut config = Config::new();
    config
        .set_min_mapping_quality(20)
        .set_min_aligned_length(30)
        .set_threads(2)
        .set_batch_size(16);
    config
}

fn profile(index: &ReferenceIndex, config: Config, records: Vec<AlignmentRecord>) -> Result<SampleProfile> {
    let mut engine = Engine::new(index, config)?;
    engine.run("sample", records.into_iter().map(Ok))
}

fn depth_at(profile: &SampleProfile, species: &str, target: &str, position: u32) -> Result<u32> {
    let report = profile.species_report(species).ok_or_eyre("Unknown species")?;
    let depth = report
        .sites()
        .iter()
        .filter(|x| x.target() == target)
        .flat_map(|x| x.calls())
        .find(|x| *x.position() == position)
        .map(|x| *x.depth())
        .unwrap_or(0);
    Ok(depth)
}

#[test]
fn regression() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let index = reference()?;
    let profile = profile(&index, config(), records())?;

    // Diagnostics
    let diagnostics = profile.diagnostics();
    let filter = diagnostics.filter();
    ensure!(*diagnostics.records() == 350);
    ensure!(filter.accepted() == 347);
    ensure!(filter.rejected(RejectReason::MissingReferenceEntry) == 1);
    ensure!(filter.rejected(RejectReason::LowMappingQuality) == 1);
    ensure!(filter.rejected(RejectReason::ShortAlignment) == 1);
    ensure!(filter.total() == *diagnostics.records());

    // Species abundance
    let sp_a = profile.species_report("sp_a").ok_or_eyre("sp_a is missing")?;
    let abundance = sp_a.abundance().ok_or_eyre("sp_a must be detected")?;
    ensure!((abundance.genome_coverage() - 10.0).abs() < EPSILON);
    ensure!((abundance.relative_abundance() - 10.0 / 13.0).abs() < EPSILON);
    ensure!(*abundance.markers_covered() == 3);

    let total: f64 = profile.detected().map(|(_, x)| *x.relative_abundance()).sum();
    ensure!((total - 1.0).abs() < EPSILON);

    // Pangenome genes
    let genes = sp_a.genes();
    ensure!(genes.len() == 2);
    ensure!(genes[0].gene() == "a_g1");
    ensure!((genes[0].coverage() - 5.0).abs() < EPSILON);
    ensure!(*genes[0].presence() == Some(true));
    ensure!(genes[0].copy_number().is_some_and(|x| (x - 0.5).abs() < EPSILON));
    ensure!(*genes[1].coverage() == 0.0);
    ensure!(*genes[1].presence() == Some(false));

    let sp_b = profile.species_report("sp_b").ok_or_eyre("sp_b is missing")?;
    let b_gene = &sp_b.genes()[0];
    ensure!((b_gene.coverage() - 1.0).abs() < EPSILON);
    ensure!(b_gene.copy_number().is_some_and(|x| (x - 1.0 / 3.0).abs() < EPSILON));

    // Sites
    let contig = sp_a
        .sites()
        .iter()
        .find(|x| x.target() == "a_contig")
        .ok_or_eyre("a_contig must have sites")?;
    ensure!(contig.calls().len() == 150);
    let site = contig
        .calls()
        .iter()
        .find(|x| *x.position() == 500)
        .ok_or_eyre("Site 500 is missing")?;
    ensure!(*site.consensus() == Some(Nucleotide::A));
    ensure!(*site.alt() == Some(Nucleotide::G));
    ensure!(*site.depth() == 10);
    ensure!(*site.flag() == QualityFlag::Pass);
    ensure!(site.alt_frequency().is_some_and(|x| (x - 0.3).abs() < EPSILON));
    ensure!(site.consensus_frequency().is_some_and(|x| (x - 0.7).abs() < EPSILON));

    let gene_site = contig
        .calls()
        .iter()
        .find(|x| *x.position() == 150)
        .ok_or_eyre("Site 150 is missing")?;
    ensure!(*gene_site.consensus() == Some(Nucleotide::C));
    ensure!(*gene_site.alt() == None);
    ensure!(sp_b.sites().is_empty());
    Ok(())
}

#[test]
fn order_and_threads_independence() -> Result<()> {
    let index = reference()?;
    for policy in [MultimapPolicy::KeepAll, MultimapPolicy::BestHit] {
        let mut config = config();
        config.set_multimap_policy(policy);
        let expected = profile(&index, config.clone(), records())?;

        let mut reversed = records();
        reversed.reverse();
        for (threads, batch) in [(1, 1024), (4, 1), (3, 7)] {
            let mut config = config.clone();
            config.set_threads(threads).set_batch_size(batch);
            ensure!(profile(&index, config.clone(), records())? == expected);
            ensure!(profile(&index, config, reversed.clone())? == expected);
        }
    }
    Ok(())
}

#[test]
fn best_hit_assignment() -> Result<()> {
    let index = reference()?;
    let mut records = records();
    for ind in 0..50 {
        for target in ["a_contig", "b_contig"] {
            records.push(read(format!("multi_{ind}"), target, 600, &[b'T'; 50], 60, 0));
        }
    }
    records.push(read("better".into(), "a_contig", 700, &[b'G'; 50], 60, 0));
    records.push(read("better".into(), "b_contig", 700, &[b'G'; 50], 60, 3));
    // Mates of one fragment are scored jointly and assigned together
    let mate = |target: &str, start: u32, edit_distance: u32, segment: Segment| {
        read("pair".into(), target, start, &[b'C'; 50], 60, edit_distance).with_segment(segment)
    };
    records.push(mate("a_contig", 800, 1, Segment::First));
    records.push(mate("a_contig", 900, 1, Segment::Last));
    records.push(mate("b_contig", 800, 0, Segment::First));

    let mut config = config();
    config.set_multimap_policy(MultimapPolicy::KeepAll);
    let kept = profile(&index, config.clone(), records.clone())?;
    ensure!(depth_at(&kept, "sp_a", "a_contig", 600)? == 50);
    ensure!(depth_at(&kept, "sp_b", "b_contig", 600)? == 50);
    ensure!(depth_at(&kept, "sp_b", "b_contig", 800)? == 1);
    ensure!(*kept.diagnostics().best_hit_discarded() == 0);

    config.set_multimap_policy(MultimapPolicy::BestHit);
    let best = profile(&index, config, records)?;
    let diagnostics = best.diagnostics();
    ensure!(*diagnostics.best_hit_discarded() == 52);
    ensure!(*diagnostics.ambiguous_reads() == 50);

    let on_a = depth_at(&best, "sp_a", "a_contig", 600)?;
    let on_b = depth_at(&best, "sp_b", "b_contig", 600)?;
    ensure!(on_a + on_b == 50);
    ensure!(depth_at(&best, "sp_a", "a_contig", 700)? == 1);
    ensure!(depth_at(&best, "sp_b", "b_contig", 700)? == 0);
    ensure!(depth_at(&best, "sp_a", "a_contig", 800)? == 1);
    ensure!(depth_at(&best, "sp_a", "a_contig", 900)? == 1);
    ensure!(depth_at(&best, "sp_b", "b_contig", 800)? == 0);

    // Marker-derived abundance is not affected by the assignment
    let a = best.species_report("sp_a").and_then(|x| *x.abundance());
    let b = kept.species_report("sp_a").and_then(|x| *x.abundance());
    ensure!(a == b);
    Ok(())
}

#[test]
fn species_selection() -> Result<()> {
    let index = reference()?;
    let mut config = config();
    config.set_min_species_abundance(0.5);
    let profile = profile(&index, config, records())?;

    let sp_b = profile.species_report("sp_b").ok_or_eyre("sp_b is missing")?;
    ensure!(!sp_b.selected());
    ensure!(sp_b.abundance().is_some());
    ensure!(sp_b.genes().is_empty() && sp_b.sites().is_empty());

    let diagnostics = profile.diagnostics();
    ensure!(diagnostics.unselected_species() == &["sp_b".to_string()]);
    ensure!(diagnostics.filter().rejected(RejectReason::SpeciesNotSelected) == 2);
    ensure!(diagnostics.filter().accepted() == 345);

    let sp_a = profile.species_report("sp_a").ok_or_eyre("sp_a is missing")?;
    ensure!(*sp_a.selected() && sp_a.genes().len() == 2);
    Ok(())
}

#[test]
fn read_errors_fail_the_sample() -> Result<()> {
    let index = reference()?;
    let mut engine = Engine::new(&index, config())?;
    let mut stream: Vec<Result<AlignmentRecord>> = records().into_iter().map(Ok).collect();
    stream.insert(10, Err(eyre!("truncated input")));
    let err = engine
        .run("broken", stream)
        .err()
        .ok_or_eyre("Read error was ignored")?;
    ensure!(format!("{err:#}").contains("Failed to read alignment records: truncated input"));

    // The engine is reusable after a failure
    let profile = engine.run("sample", records().into_iter().map(Ok))?;
    ensure!(*profile.diagnostics().records() == 350);
    Ok(())
}

#[test]
fn artifact_round_trip() -> Result<()> {
    let index = reference()?;
    let profile = profile(&index, config(), records())?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("sample.profile");
    artifact::save(&profile, &path)?;
    ensure!(!dir.path().join("sample.profile.partial").exists());
    ensure!(artifact::load(&path)? == profile);

    std::fs::write(dir.path().join("garbage.profile"), b"not a profile")?;
    ensure!(artifact::load(dir.path().join("garbage.profile")).is_err());

    artifact::export(&profile, dir.path(), ".tsv.gz")?;
    let mut species = String::new();
    std::io::Read::read_to_string(
        &mut compression::read_file(dir.path().join("sample.species.tsv.gz"))?.box_bufread(),
        &mut species,
    )?;
    let lines: Vec<&str> = species.lines().collect();
    ensure!(lines.len() == 3);
    ensure!(lines[0] == artifact::SPECIES_HEADER.join("\t"));
    ensure!(lines[1].starts_with("sp_a\t10.000000\t"));

    let mut genes = String::new();
    std::io::Read::read_to_string(
        &mut compression::read_file(dir.path().join("sample.genes.tsv.gz"))?.box_bufread(),
        &mut genes,
    )?;
    ensure!(genes.lines().any(|x| x == "sp_a\ta_g1\t5.000000\t1\t0.500000"));
    Ok(())
}
