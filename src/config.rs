//! Run options shared by every table of a comparison

use crate::cli::Cli;
use crate::error::{BatchDiffError, Result};
use crate::strategy::StrategyKind;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Placeholder replaced by the table name in name templates
pub const TABLE_PLACEHOLDER: &str = "<TABLE>";

pub const DEFAULT_WORKERS: usize = 4;

/// Validated options of one comparison run
#[derive(Debug, Clone, Serialize)]
pub struct CompareOptions {
    pub source: String,
    pub target: String,
    #[serde(skip)]
    pub source_init: Option<String>,
    #[serde(skip)]
    pub target_init: Option<String>,
    pub tables: Vec<String>,
    pub table_mapping: String,
    pub strategy: StrategyKind,
    pub batch_size: Option<u64>,
    pub key: String,
    pub key_start: Option<String>,
    pub key_stop: Option<String>,
    pub order_by: Option<String>,
    pub columns: Option<Vec<String>>,
    pub where_source: Option<String>,
    pub where_target: Option<String>,
    pub custom_select: Option<String>,
    pub no_null_check: bool,
    pub recheck_for_errors: Option<u64>,
    pub limit_to_the_past_minutes: Option<u64>,
    pub workers: usize,
    pub diff_command: Option<PathBuf>,
    pub tmp_dir: Option<PathBuf>,
    pub extract_result_to_file: Option<String>,
    pub record_sql_file: Option<PathBuf>,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            source: ":memory:".to_string(),
            target: ":memory:".to_string(),
            source_init: None,
            target_init: None,
            tables: Vec::new(),
            table_mapping: TABLE_PLACEHOLDER.to_string(),
            strategy: StrategyKind::OneShot,
            batch_size: None,
            key: "id".to_string(),
            key_start: None,
            key_stop: None,
            order_by: Some("id".to_string()),
            columns: None,
            where_source: None,
            where_target: None,
            custom_select: None,
            no_null_check: false,
            recheck_for_errors: None,
            limit_to_the_past_minutes: None,
            workers: DEFAULT_WORKERS,
            diff_command: None,
            tmp_dir: None,
            extract_result_to_file: None,
            record_sql_file: None,
        }
    }
}

impl CompareOptions {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let options = Self {
            source: cli.src.clone(),
            target: cli.target.clone(),
            source_init: cli.src_init.clone(),
            target_init: cli.target_init.clone(),
            tables: split_list(&cli.tables),
            table_mapping: cli.table_mapping.clone(),
            strategy: StrategyKind::parse(&cli.strategy)?,
            batch_size: cli.batch_size,
            key: cli.key.clone(),
            key_start: cli.key_start.clone(),
            key_stop: cli.key_stop.clone(),
            order_by: non_empty(&cli.order_by),
            columns: cli.columns.as_deref().map(split_list),
            where_source: cli.where_source.clone(),
            where_target: cli.where_target.clone(),
            custom_select: cli.custom_select.clone(),
            no_null_check: cli.no_null_check,
            recheck_for_errors: cli.recheck_for_errors,
            limit_to_the_past_minutes: cli.limit_to_the_past_minutes,
            workers: cli.parallel,
            diff_command: cli.diff_command.clone(),
            tmp_dir: cli.tmp_dir.clone(),
            extract_result_to_file: cli.extract_result_to_file.clone(),
            record_sql_file: cli.record_sql_file.clone(),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(BatchDiffError::config("No tables to compare"));
        }
        if self.key.trim().is_empty() {
            return Err(BatchDiffError::config("Key column must not be empty"));
        }
        if self.workers == 0 {
            return Err(BatchDiffError::config("Parallel workers must be greater than 0"));
        }
        if self.batch_size == Some(0) {
            return Err(BatchDiffError::config("Batch size must be greater than 0"));
        }
        if let Some(columns) = &self.columns {
            if columns.is_empty() {
                return Err(BatchDiffError::config("Column list must not be empty"));
            }
        }
        if self.limit_to_the_past_minutes.is_some() && self.strategy != StrategyKind::ByTimestamp {
            log::warn!(
                "limit_to_the_past_minutes only applies to the by_timestamp strategy, ignoring it"
            );
        }
        if self.key_start.is_some() && self.strategy == StrategyKind::OneShot {
            log::warn!("key_start is ignored by the one_shot strategy");
        }
        Ok(())
    }

    /// Target table name for `table`, from the mapping template
    pub fn target_table(&self, table: &str) -> String {
        self.table_mapping.replace(TABLE_PLACEHOLDER, table)
    }

    /// Delay before rechecking a failed batch, when enabled
    pub fn recheck_delay(&self) -> Option<Duration> {
        self.recheck_for_errors.map(Duration::from_secs)
    }

    /// Both sides point at the same database file
    pub fn same_database(&self) -> bool {
        self.source == self.target && self.source != ":memory:"
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}
