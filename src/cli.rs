//! Command-line interface for batchdiff

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "batchdiff")]
#[command(about = "Compare tables between two databases, batch by batch")]
#[command(version)]
pub struct Cli {
    /// Source DuckDB database file (":memory:" for an empty in-memory one)
    #[arg(long)]
    pub src: String,

    /// Target DuckDB database file
    #[arg(long)]
    pub target: String,

    /// SQL run on the source connection first, e.g. to ATTACH a database.
    /// {ENV_VAR} placeholders are substituted.
    #[arg(long)]
    pub src_init: Option<String>,

    /// SQL run on the target connection first
    #[arg(long)]
    pub target_init: Option<String>,

    /// Comma separated list of tables to compare
    #[arg(long)]
    pub tables: String,

    /// Target table name template, <TABLE> is the source table name
    #[arg(long, default_value = "<TABLE>")]
    pub table_mapping: String,

    /// Batching strategy: "one_shot", "by_id" or "by_timestamp"
    #[arg(long, default_value = "one_shot")]
    pub strategy: String,

    /// Rows per batch for by_id, days per batch for by_timestamp
    #[arg(long, value_parser = validate_batch_size)]
    pub batch_size: Option<u64>,

    /// Column the batches are cut on
    #[arg(long, default_value = "id")]
    pub key: String,

    /// First key value, instead of the minimum of both sides
    #[arg(long, allow_hyphen_values = true)]
    pub key_start: Option<String>,

    /// Last key value (inclusive), instead of the maximum of both sides
    #[arg(long, allow_hyphen_values = true)]
    pub key_stop: Option<String>,

    /// Row identity column the extracts are sorted on, empty to disable
    #[arg(long, default_value = "id")]
    pub order_by: String,

    /// Comma separated list of columns to compare, default all
    #[arg(long)]
    pub columns: Option<String>,

    /// Extra condition on the source side
    #[arg(long)]
    pub where_source: Option<String>,

    /// Extra condition on the target side
    #[arg(long)]
    pub where_target: Option<String>,

    /// Select list replacing the column list, e.g. "count(*)"
    #[arg(long)]
    pub custom_select: Option<String>,

    /// Accept a nullable key column
    #[arg(long)]
    pub no_null_check: bool,

    /// Recheck the differing rows of a batch once, after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub recheck_for_errors: Option<u64>,

    /// Ignore rows whose timestamp key is within the last N minutes
    #[arg(long, value_name = "MINUTES")]
    pub limit_to_the_past_minutes: Option<u64>,

    /// Number of batches compared concurrently
    #[arg(long, default_value = "4")]
    pub parallel: usize,

    /// External diff program, default is the built-in diff
    #[arg(long)]
    pub diff_command: Option<PathBuf>,

    /// Directory for the external diff program's temporary files
    #[arg(long)]
    pub tmp_dir: Option<PathBuf>,

    /// Write differing keys to this file, <TABLE> is the table name
    #[arg(long)]
    pub extract_result_to_file: Option<String>,

    /// Append every executed SQL statement to this file
    #[arg(long)]
    pub record_sql_file: Option<PathBuf>,

    /// Output the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Default log level, `-v` raises it to debug
    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }
}

/// Validate that batch size is greater than 0
fn validate_batch_size(s: &str) -> Result<u64, String> {
    let batch_size: u64 = s
        .parse()
        .map_err(|_| format!("Invalid batch size: '{}'. Must be a positive integer.", s))?;

    if batch_size == 0 {
        return Err("Batch size must be greater than 0".to_string());
    }

    Ok(batch_size)
}
