//! Bounded-concurrency execution of batch work items

use crate::comparer::{BatchOutcome, WorkItem};
use crate::error::{BatchDiffError, Result};
use crate::progress::ProgressReporter;
use crate::stats::StatsCollector;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Tally of batch outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub identical: usize,
    pub rechecked: usize,
    pub with_discrepancies: usize,
    pub discrepancies: usize,
}

/// Runs work items on a dedicated pool of `workers` threads.
///
/// Batches never abort each other: a discrepancy is just recorded. A failing
/// query or differ stops new items from starting, lets running ones finish
/// and is returned once the pool drains.
pub struct ParallelExecutor {
    workers: usize,
    stats: Arc<StatsCollector>,
}

impl ParallelExecutor {
    pub fn new(workers: usize, stats: Arc<StatsCollector>) -> Self {
        Self {
            workers: workers.max(1),
            stats,
        }
    }

    pub fn run(&self, items: &[WorkItem], progress: &ProgressReporter) -> Result<ExecutionReport> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("batchdiff-worker-{}", i))
            .build()
            .map_err(|e| BatchDiffError::Generic(e.into()))?;

        log::info!(
            "Running {} batch(es) on {} worker(s)",
            items.len(),
            self.workers
        );

        let abort = AtomicBool::new(false);
        let first_error: Mutex<Option<BatchDiffError>> = Mutex::new(None);

        let outcomes: Vec<BatchOutcome> = pool.install(|| {
            items
                .par_iter()
                .with_max_len(1)
                .filter_map(|item| {
                    if abort.load(Ordering::SeqCst) {
                        return None;
                    }
                    let result = item.comparer.process_batch(&item.batch, true);
                    self.stats.add_batch();
                    progress.inc();

                    match result {
                        Ok(outcome) => Some(outcome),
                        Err(e) => {
                            log::error!(
                                "[{}] Batch {} failed: {}",
                                item.comparer.table(),
                                item.batch.name,
                                e
                            );
                            abort.store(true, Ordering::SeqCst);
                            let mut slot = first_error.lock().unwrap_or_else(|e| e.into_inner());
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            None
                        }
                    }
                })
                .collect()
        });

        if let Some(e) = first_error.into_inner().unwrap_or_else(|e| e.into_inner()) {
            return Err(e);
        }

        let mut report = ExecutionReport::default();
        for outcome in outcomes {
            match outcome {
                BatchOutcome::Identical { rechecked } => {
                    report.identical += 1;
                    if rechecked {
                        report.rechecked += 1;
                    }
                }
                BatchOutcome::Discrepancies(records) => {
                    report.with_discrepancies += 1;
                    report.discrepancies += records.len();
                }
            }
        }
        Ok(report)
    }
}
