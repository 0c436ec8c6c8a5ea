//! Per-table comparison: schema validation, batch planning and batch runs

use crate::config::CompareOptions;
use crate::database::Database;
use crate::diff::{DiffOutput, LineDiffer};
use crate::error::{BatchDiffError, Result};
use crate::extract::ResultExtractor;
use crate::reconcile::{extract_key, DiffRecord, DiffReconciler};
use crate::stats::StatsCollector;
use crate::strategy::{Batch, BatchContext};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

/// Shared collaborators of every table in a run
#[derive(Clone)]
pub struct CompareContext {
    pub options: Arc<CompareOptions>,
    pub source: Arc<dyn Database>,
    pub target: Arc<dyn Database>,
    pub differ: Arc<dyn LineDiffer>,
    pub stats: Arc<StatsCollector>,
    /// Reference time for relative timestamp bounds
    pub now: NaiveDateTime,
}

impl CompareContext {
    pub fn new(
        options: CompareOptions,
        source: Arc<dyn Database>,
        target: Arc<dyn Database>,
        differ: Arc<dyn LineDiffer>,
    ) -> Self {
        Self {
            options: Arc::new(options),
            source,
            target,
            differ,
            stats: Arc::new(StatsCollector::new()),
            now: chrono::Utc::now().naive_utc(),
        }
    }
}

/// Validated description of one table pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub table: String,
    pub target_table: String,
    /// Extracted columns, row identity first
    pub columns: Vec<String>,
    /// Select-list expressions matching `columns`
    pub select_list: Vec<String>,
    pub key: String,
}

/// One unit of work for the executor
#[derive(Clone)]
pub struct WorkItem {
    pub comparer: Arc<TableComparer>,
    pub batch: Batch,
}

/// How a batch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Identical { rechecked: bool },
    Discrepancies(Vec<DiffRecord>),
}

#[derive(Clone, Copy)]
enum Side {
    Source,
    Target,
}

/// Owns the comparison lifecycle of one table
pub struct TableComparer {
    ctx: CompareContext,
    spec: TableSpec,
    extractor: Option<ResultExtractor>,
}

impl TableComparer {
    /// Read both schemas and validate the comparison can run
    pub fn configure(ctx: &CompareContext, table: &str) -> Result<Self> {
        let options = &ctx.options;
        let target_table = options.target_table(table);

        log::info!("[{}] Reading source columns", table);
        let source_columns = ctx.source.columns(table)?;
        if source_columns.is_empty() {
            return Err(BatchDiffError::schema(table, "Table not found in source"));
        }

        let mut columns: Vec<String> = match &options.columns {
            Some(allowed) => {
                if let Some(unknown) = allowed.iter().find(|c| !source_columns.contains_key(*c)) {
                    return Err(BatchDiffError::schema(
                        table,
                        format!("Column {} not found in source", unknown),
                    ));
                }
                source_columns
                    .keys()
                    .filter(|c| allowed.contains(*c))
                    .cloned()
                    .collect()
            }
            None => source_columns.keys().cloned().collect(),
        };

        let key = match source_columns.get(&options.key) {
            Some(info) if columns.contains(&options.key) => info,
            Some(_) => {
                return Err(BatchDiffError::schema(
                    table,
                    format!("Key column {} is not among the compared columns", options.key),
                ))
            }
            None => {
                return Err(BatchDiffError::schema(
                    table,
                    format!("Key column {} not found in source", options.key),
                ))
            }
        };
        if key.nullable && !options.no_null_check {
            return Err(BatchDiffError::schema(
                table,
                format!(
                    "Key column {} is nullable, use --no-null-check to compare anyway",
                    options.key
                ),
            ));
        }

        if let Some(order_by) = &options.order_by {
            if !source_columns.contains_key(order_by) {
                return Err(BatchDiffError::schema(
                    table,
                    format!("Order column {} not found in source", order_by),
                ));
            }
            if let Some(pos) = columns.iter().position(|c| c == order_by) {
                let identity = columns.remove(pos);
                columns.insert(0, identity);
            }
        }

        log::info!("[{}] Reading target columns from {}", table, target_table);
        let target_columns = ctx.target.columns(&target_table)?;
        if target_columns.is_empty() {
            return Err(BatchDiffError::schema(
                table,
                format!("Table {} not found in target", target_table),
            ));
        }

        let missing: Vec<&str> = columns
            .iter()
            .filter(|c| !target_columns.contains_key(*c))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(BatchDiffError::schema(
                table,
                format!("Columns missing in target: {}", missing.join(", ")),
            ));
        }

        let extra: Vec<&str> = target_columns
            .keys()
            .filter(|c| !source_columns.contains_key(*c))
            .map(String::as_str)
            .collect();
        if !extra.is_empty() {
            log::warn!(
                "[{}] Columns only in target are not compared: {}",
                table,
                extra.join(", ")
            );
        }

        let select_list = columns
            .iter()
            .map(|name| match source_columns.get(name) {
                Some(info) if info.needs_text_cast() => {
                    format!("CAST({} AS VARCHAR) AS {}", name, name)
                }
                _ => name.clone(),
            })
            .collect();

        let extractor = match &options.extract_result_to_file {
            Some(template) => Some(ResultExtractor::create(template, table)?),
            None => None,
        };

        log::debug!("[{}] Comparing columns: {}", table, columns.join(", "));
        Ok(Self {
            ctx: ctx.clone(),
            spec: TableSpec {
                table: table.to_string(),
                target_table,
                columns,
                select_list,
                key: options.key.clone(),
            },
            extractor,
        })
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    pub fn table(&self) -> &str {
        &self.spec.table
    }

    /// Plan this table's batches with the configured strategy
    pub fn compute_batches(self: &Arc<Self>) -> Result<Vec<WorkItem>> {
        let options = &self.ctx.options;
        let batch_ctx = BatchContext {
            table: &self.spec.table,
            target_table: &self.spec.target_table,
            key: &self.spec.key,
            batch_size: options.batch_size,
            key_start: options.key_start.as_deref(),
            key_stop: options.key_stop.as_deref(),
            limit_to_the_past_minutes: options.limit_to_the_past_minutes,
            now: self.ctx.now,
            source: self.ctx.source.as_ref(),
            target: self.ctx.target.as_ref(),
        };

        let batches = options.strategy.strategy().produce_batches(&batch_ctx)?;
        log::info!(
            "[{}] {} batch(es) with strategy {}",
            self.spec.table,
            batches.len(),
            options.strategy
        );

        Ok(batches
            .into_iter()
            .map(|batch| WorkItem {
                comparer: Arc::clone(self),
                batch,
            })
            .collect())
    }

    /// Compare one batch, rechecking the offending rows once when enabled.
    ///
    /// Discrepancies are recorded in the stats and are not an `Err`; only a
    /// failing query or differ is.
    pub fn process_batch(&self, batch: &Batch, allow_recheck: bool) -> Result<BatchOutcome> {
        let options = &self.ctx.options;
        let table = &self.spec.table;
        let recheck_delay = options
            .recheck_delay()
            .filter(|_| allow_recheck && options.custom_select.is_none());

        let mut current = batch.clone();
        let mut rechecks_left = u8::from(recheck_delay.is_some());
        // first pass discrepancies while their recheck runs
        let mut pending: Option<(Vec<DiffRecord>, DiffOutput)> = None;

        loop {
            log::debug!("[{}] Comparing batch {}", table, current.name);
            let (output, source_rows) = self.compare(&current)?;
            if pending.is_none() {
                self.ctx.stats.add_lines(output.source_lines);
            }

            if output.is_identical() {
                let Some((records, first_output)) = pending.take() else {
                    return Ok(BatchOutcome::Identical { rechecked: false });
                };

                // identical but empty on both sides is not a resolution
                let found: HashSet<&str> = source_rows.iter().map(|row| extract_key(row)).collect();
                let vanished: Vec<DiffRecord> = records
                    .into_iter()
                    .filter(|record| !found.contains(record.key()))
                    .collect();
                if vanished.is_empty() {
                    log::info!("[{}] Batch {} is identical on recheck", table, batch.name);
                    return Ok(BatchOutcome::Identical { rechecked: true });
                }

                log::warn!(
                    "[{}] Recheck of batch {} returned no rows for: {}",
                    table,
                    batch.name,
                    vanished.iter().map(DiffRecord::key).collect::<Vec<_>>().join(", ")
                );
                return self.record_discrepancies(batch, vanished, &first_output);
            }

            let records = DiffReconciler::reconcile(&output.lines);

            if let (Some(delay), true) = (recheck_delay, rechecks_left > 0) {
                let keys = DiffReconciler::keys(&records);
                log::info!(
                    "[{}] {} difference(s) on batch {}, rechecking in {}s: {}",
                    table,
                    records.len(),
                    batch.name,
                    delay.as_secs(),
                    keys.join(", ")
                );
                thread::sleep(delay);
                current = batch.recheck(&self.spec.columns[0], keys);
                rechecks_left -= 1;
                pending = Some((records, output));
                continue;
            }

            return self.record_discrepancies(batch, records, &output);
        }
    }

    fn record_discrepancies(
        &self,
        batch: &Batch,
        records: Vec<DiffRecord>,
        output: &DiffOutput,
    ) -> Result<BatchOutcome> {
        let table = &self.spec.table;
        self.ctx
            .stats
            .add_error(format!("[{}] Errors on batch: {}", table, batch.name));
        log::warn!(
            "[{}] {} difference(s) on batch {}",
            table,
            records.len(),
            batch.name
        );
        log::debug!("[{}] Diff of batch {}:\n{}", table, batch.name, output.to_text());

        if let Some(extractor) = &self.extractor {
            extractor.extract(&records)?;
        }
        Ok(BatchOutcome::Discrepancies(records))
    }

    /// Extract both sides and diff them, returning the source rows too
    fn compare(&self, batch: &Batch) -> Result<(DiffOutput, Vec<String>)> {
        let source_sql = self.select_sql(Side::Source, batch);
        let target_sql = self.select_sql(Side::Target, batch);

        // scoped thread instead of rayon::join, which would let this pool
        // worker pick up another batch while blocked
        let (source, target) = thread::scope(|scope| {
            let source = scope.spawn(|| self.ctx.source.query_lines(&source_sql));
            let target = self.ctx.target.query_lines(&target_sql);
            let source = source
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (source, target)
        });
        let (source, target) = (source?, target?);

        let output = self.ctx.differ.diff(&source, &target)?;
        Ok((output, source))
    }

    /// Extraction query of one side
    fn select_sql(&self, side: Side, batch: &Batch) -> String {
        let options = &self.ctx.options;
        let (table, filter) = match side {
            Side::Source => (&self.spec.table, &options.where_source),
            Side::Target => (&self.spec.target_table, &options.where_target),
        };

        let select = match &options.custom_select {
            Some(custom) => custom.clone(),
            None => self.spec.select_list.join(", "),
        };

        let mut sql = format!("SELECT {} FROM {} WHERE {}", select, table, batch.where_clause());
        if let Some(filter) = filter {
            sql.push_str(&format!(" AND ({})", filter));
        }
        if options.custom_select.is_none() {
            if let Some(order_by) = &options.order_by {
                sql.push_str(&format!(" ORDER BY {}", order_by));
            }
        }
        sql
    }
}
