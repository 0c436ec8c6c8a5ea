//! Comparison driver for the batchdiff CLI

use crate::cli::Cli;
use crate::comparer::{CompareContext, TableComparer, WorkItem};
use crate::config::CompareOptions;
use crate::database::{Database, DuckDbDatabase, SqlRecorder};
use crate::diff::{CommandDiff, InProcessDiff, LineDiffer};
use crate::error::Result;
use crate::executor::{ExecutionReport, ParallelExecutor};
use crate::output::{JsonFormatter, PrettyPrinter};
use crate::progress::ProgressReporter;
use crate::stats::RunStats;
use crate::strategy::StrategyKind;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Exit status when every batch matched
pub const EXIT_OK: i32 = 0;
/// Exit status when discrepancies were recorded
pub const EXIT_DISCREPANCIES: i32 = 1;
/// Exit status on a fatal error
pub const EXIT_FATAL: i32 = 2;

/// Everything known about a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub tables: Vec<String>,
    pub strategy: StrategyKind,
    pub batches_planned: usize,
    pub report: ExecutionReport,
    pub stats: RunStats,
    pub elapsed_ms: u64,
    pub options: CompareOptions,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.stats.is_success()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            EXIT_OK
        } else {
            EXIT_DISCREPANCIES
        }
    }
}

/// Run the comparison described by the command line and print its summary
pub fn execute(cli: &Cli) -> Result<RunSummary> {
    let options = CompareOptions::from_cli(cli)?;

    let mut progress = if cli.json || cli.no_progress {
        ProgressReporter::new_minimal()
    } else {
        ProgressReporter::new()
    };

    let summary = run_comparison(options, &mut progress)?;
    drop(progress);

    if cli.json {
        println!("{}", JsonFormatter::format(&summary)?);
    } else {
        PrettyPrinter::print_summary(&summary);
    }
    Ok(summary)
}

/// Open both databases from the options and run the comparison
pub fn run_comparison(options: CompareOptions, progress: &mut ProgressReporter) -> Result<RunSummary> {
    let recorder = match &options.record_sql_file {
        Some(path) => {
            log::info!("Recording SQL statements to {}", path.display());
            Some(Arc::new(SqlRecorder::create(path)?))
        }
        None => None,
    };

    let mut source = DuckDbDatabase::open("source", &options.source, options.source_init.as_deref())?;
    if let Some(recorder) = &recorder {
        source = source.with_recorder(Arc::clone(recorder));
    }

    // DuckDB holds an exclusive lock per file, so one file means one instance
    let target = if options.same_database() {
        log::debug!("Source and target share {}", options.source);
        source.share("target", options.target_init.as_deref())?
    } else {
        let target =
            DuckDbDatabase::open("target", &options.target, options.target_init.as_deref())?;
        match &recorder {
            Some(recorder) => target.with_recorder(Arc::clone(recorder)),
            None => target,
        }
    };

    let differ: Arc<dyn LineDiffer> = match &options.diff_command {
        Some(program) => {
            let differ = CommandDiff::new(program);
            match &options.tmp_dir {
                Some(dir) => Arc::new(differ.with_tmp_dir(dir)),
                None => Arc::new(differ),
            }
        }
        None => Arc::new(InProcessDiff),
    };

    run_with(options, Arc::new(source), Arc::new(target), differ, progress)
}

/// Run the comparison against already opened databases
pub fn run_with(
    options: CompareOptions,
    source: Arc<dyn Database>,
    target: Arc<dyn Database>,
    differ: Arc<dyn LineDiffer>,
    progress: &mut ProgressReporter,
) -> Result<RunSummary> {
    let started = Instant::now();
    let ctx = CompareContext::new(options, source, target, differ);

    // every schema is validated before any batch runs
    let mut comparers = Vec::with_capacity(ctx.options.tables.len());
    for table in &ctx.options.tables {
        progress.update_planning(&format!("Reading schema of {}", table));
        comparers.push(Arc::new(TableComparer::configure(&ctx, table)?));
    }

    let mut items: Vec<WorkItem> = Vec::new();
    for comparer in &comparers {
        progress.update_planning(&format!("Planning batches of {}", comparer.table()));
        items.extend(comparer.compute_batches()?);
    }

    progress.start_batches(items.len() as u64);
    let executor = ParallelExecutor::new(ctx.options.workers, Arc::clone(&ctx.stats));
    let report = executor.run(&items, progress)?;

    let stats = ctx.stats.snapshot();
    progress.finish(if stats.is_success() {
        "identical"
    } else {
        "differences found"
    });

    for error in &stats.errors {
        log::error!("{}", error);
    }
    log::info!(
        "Compared {} line(s) in {} batch(es), {} error(s)",
        stats.lines,
        stats.batches,
        stats.errors.len()
    );

    Ok(RunSummary {
        tables: ctx.options.tables.clone(),
        strategy: ctx.options.strategy,
        batches_planned: items.len(),
        report,
        stats,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        options: (*ctx.options).clone(),
    })
}
