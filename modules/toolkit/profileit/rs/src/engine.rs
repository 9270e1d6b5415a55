use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::{eyre, Result, WrapErr};
use metabit_core_rs::parallelism;
use metabit_core_rs::record::AlignmentRecord;
use metabit_core_rs::refdb::ReferenceIndex;
use metabit_core_rs::Error;
use rayon::prelude::*;
use rayon::ThreadPool;
use thread_local::ThreadLocal;

use crate::abundance::{self, Estimator, SpeciesAbundance};
use crate::aggregate::{Accumulator, Coverage};
use crate::config::{Config, MultimapPolicy};
use crate::filter::{AlignmentFilter, RejectReason};
use crate::layout::GeneLayout;
use crate::pangenome::{self, FractionOfGenome, PresenceRule};
use crate::result::{CorruptTarget, Diagnostics, SampleProfile, SpeciesReport, TargetSites};
use crate::variants::VariantCaller;
use crate::worker::{Pass, Worker};

/// Species report together with the per-species diagnostics collected while calling it.
struct Called {
    report: SpeciesReport,
    malformed: u64,
    corrupt: Vec<CorruptTarget>,
}

/// Profiles samples against a single reference index.
///
/// Records are streamed in batches to a pool of workers, each accumulating thread-local coverage
/// that is sum-merged once the stream is exhausted. Everything downstream (abundance, genes,
/// sites) is computed from the merged coverage, so the profile doesn't depend on the number of
/// threads or the order of records in the input.
pub struct Engine<'a> {
    index: &'a ReferenceIndex,
    config: Config,
    layout: GeneLayout,
    estimator: Box<dyn Estimator>,
    presence: Box<dyn PresenceRule>,
    caller: VariantCaller,
    thread_pool: ThreadPool,
    workers: ThreadLocal<RefCell<Worker>>,
}

impl<'a> Engine<'a> {
    pub fn new(index: &'a ReferenceIndex, config: Config) -> Result<Self> {
        config.validate()?;
        let thread_pool = parallelism::pool(*config.threads())?;

        Ok(Self {
            index,
            layout: GeneLayout::new(index),
            estimator: config.coverage_estimator().build(),
            presence: Box::new(FractionOfGenome::new(*config.gene_presence_threshold_fraction())),
            caller: VariantCaller::from_config(&config),
            config,
            thread_pool,
            workers: ThreadLocal::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_estimator(&mut self, estimator: Box<dyn Estimator>) -> &mut Self {
        self.estimator = estimator;
        self
    }

    pub fn set_presence_rule(&mut self, presence: Box<dyn PresenceRule>) -> &mut Self {
        self.presence = presence;
        self
    }

    /// Profile a single sample. Any read or processing error fails the whole sample.
    pub fn run<I>(&mut self, sample: &str, records: I) -> Result<SampleProfile>
    where
        I: IntoIterator<Item = Result<AlignmentRecord>>,
    {
        log::info!(
            "Profiling sample {sample} against {} using {} threads",
            self.index.stamp(),
            self.thread_pool.current_num_threads()
        );

        // Soft-reset all workers
        let min_base_quality = *self.config.min_base_quality();
        for w in self.workers.iter_mut() {
            w.get_mut().reset(min_base_quality);
        }

        let total = self
            .stream(records)
            .wrap_err_with(|| format!("Failed to profile sample {sample}"))?;
        let (accumulator, assigner, mut stats) = Worker::aggregate(
            min_base_quality,
            self.workers.iter_mut().map(|x| x.get_mut()),
        );

        // Markers are never buffered, so the abundance can be estimated before the assignment
        let (coverage, abundance, discarded, ambiguous) = match self.config.multimap_policy() {
            MultimapPolicy::KeepAll => {
                let coverage = accumulator.finalize();
                let abundance = abundance::estimate(self.index, &coverage, &*self.estimator);
                (coverage, abundance, 0, 0)
            }
            MultimapPolicy::BestHit => {
                let markers = accumulator.clone().finalize();
                let abundance = abundance::estimate(self.index, &markers, &*self.estimator);

                let assignment = assigner.resolve(&abundance);
                let mut accumulator = accumulator;
                accumulator.merge(&self.accumulate(&assignment.hits)?);
                (
                    accumulator.finalize(),
                    abundance,
                    assignment.discarded,
                    assignment.ambiguous,
                )
            }
        };

        // Species selection
        let threshold = *self.config.min_species_abundance();
        let selected: Vec<bool> = (0..self.index.species().len())
            .map(|ind| {
                threshold <= 0.0
                    || abundance
                        .get(&ind)
                        .is_some_and(|x| *x.relative_abundance() >= threshold)
            })
            .collect();

        let mut unselected = Vec::new();
        for (ind, species) in self.index.species().iter().enumerate() {
            if !selected[ind] {
                stats.revoke(RejectReason::SpeciesNotSelected, coverage.records(ind));
                unselected.push(species.name().clone());
            }
        }

        let called = self.thread_pool.install(|| {
            (0..self.index.species().len())
                .into_par_iter()
                .map(|ind| self.call_species(ind, &coverage, &abundance, selected[ind]))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut malformed = 0;
        let mut corrupt = Vec::new();
        let mut reports = Vec::with_capacity(called.len());
        for x in called {
            malformed += x.malformed;
            corrupt.extend(x.corrupt);
            reports.push(x.report);
        }

        let diagnostics = Diagnostics::new(
            total, stats, discarded, ambiguous, malformed, corrupt, unselected,
        );
        diagnostics.log(sample);

        Ok(SampleProfile::new(
            sample.to_string(),
            self.index.stamp().clone(),
            *self.config.nucleotide_tie_break_order(),
            reports,
            diagnostics,
        ))
    }

    fn stream<I>(&self, records: I) -> Result<u64>
    where
        I: IntoIterator<Item = Result<AlignmentRecord>>,
    {
        let pass = Pass {
            index: self.index,
            filter: AlignmentFilter::new(self.index, &self.config),
            layout: &self.layout,
            policy: *self.config.multimap_policy(),
        };
        let batch_size = *self.config.batch_size();
        let min_base_quality = *self.config.min_base_quality();
        let has_failed = AtomicBool::new(false);

        let (pass, workers, flag) = (&pass, &self.workers, &has_failed);
        let streamed = self.thread_pool.in_place_scope(|s| -> Result<u64> {
            let mut total = 0;
            let mut batch = Vec::with_capacity(batch_size);
            for record in records {
                // Terminate the loop if an error has occured in any of the threads
                if flag.load(Ordering::Relaxed) {
                    break;
                }

                batch.push(record?);
                total += 1;
                if batch.len() >= batch_size {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                    s.spawn(move |_| process(pass, workers, flag, min_base_quality, full));
                }
            }
            if !batch.is_empty() {
                s.spawn(move |_| process(pass, workers, flag, min_base_quality, batch));
            }
            Ok(total)
        });

        if has_failed.into_inner() {
            return Err(eyre!(
                "Failed to aggregate coverage in a worker thread, the failing batch is logged"
            ));
        }
        streamed.wrap_err("Failed to read alignment records")
    }

    fn accumulate(&self, hits: &[(usize, AlignmentRecord)]) -> Result<Accumulator> {
        let min_base_quality = *self.config.min_base_quality();
        let batch_size = *self.config.batch_size();
        self.thread_pool.install(|| {
            hits.par_chunks(batch_size)
                .map(|chunk| {
                    let mut accumulator = Accumulator::new(min_base_quality);
                    for (target, record) in chunk {
                        accumulator.add(self.index, &self.layout, *target, record)?;
                    }
                    Ok(accumulator)
                })
                .try_reduce(
                    || Accumulator::new(min_base_quality),
                    |mut a, b| {
                        a.merge(&b);
                        Ok(a)
                    },
                )
        })
    }

    fn call_species(
        &self,
        ind: usize,
        coverage: &Coverage,
        abundance: &BTreeMap<usize, SpeciesAbundance>,
        selected: bool,
    ) -> Result<Called> {
        let species = &self.index.species()[ind];
        let abundance = abundance.get(&ind).copied();

        let mut called = Called {
            report: SpeciesReport::new(
                species.name().clone(),
                *species.fingerprint(),
                selected,
                abundance,
                Vec::new(),
                Vec::new(),
            ),
            malformed: 0,
            corrupt: Vec::new(),
        };
        if !selected {
            return Ok(called);
        }

        let genes = pangenome::call_genes(
            self.index,
            species,
            coverage,
            abundance.map(|x| *x.genome_coverage()),
            &*self.presence,
        );

        let mut sites = Vec::new();
        for contig in species.contigs() {
            let target = self.index.target(*contig);
            let result = self
                .caller
                .call_target(target.name(), *target.length(), coverage.columns(*contig));
            match result {
                Ok(calls) => {
                    called.malformed += calls.malformed;
                    if !calls.calls.is_empty() {
                        sites.push(TargetSites::new(target.name().clone(), calls.calls));
                    }
                }
                Err(err) => match err.downcast_ref::<Error>() {
                    Some(Error::CorruptDatabaseIndex { target, reason }) => {
                        called
                            .corrupt
                            .push(CorruptTarget::new(target.clone(), reason.clone()));
                    }
                    _ => return Err(err),
                },
            }
        }

        let (name, fingerprint, selected, abundance, _, _) = called.report.dissolve();
        called.report = SpeciesReport::new(name, fingerprint, selected, abundance, genes, sites);
        Ok(called)
    }
}

fn process(
    pass: &Pass,
    workers: &ThreadLocal<RefCell<Worker>>,
    has_failed: &AtomicBool,
    min_base_quality: u8,
    batch: Vec<AlignmentRecord>,
) {
    if has_failed.load(Ordering::Relaxed) {
        return;
    }

    // Get the state of the worker (or create a new one if it does not exist)
    let mut worker = workers
        .get_or(|| RefCell::new(Worker::new(min_base_quality)))
        .borrow_mut();

    let records = batch.len();
    if let Err(err) = worker.process(pass, batch) {
        has_failed.store(true, Ordering::Relaxed);
        log::error!("Coverage aggregation failed for a batch of {records} records: {err:?}");
    }
}
