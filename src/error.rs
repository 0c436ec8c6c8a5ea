//! Error types for batchdiff operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BatchDiffError>;

#[derive(Error, Debug)]
pub enum BatchDiffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("[{table}] {message}")]
    Schema { table: String, message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Diff failed: {message}")]
    Diff { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl BatchDiffError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn schema(table: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Schema {
            table: table.into(),
            message: msg.into(),
        }
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query {
            message: msg.into(),
        }
    }

    pub fn diff(msg: impl Into<String>) -> Self {
        Self::Diff {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Errors raised before any batch runs (bad options, bad schema)
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::Schema { .. } | Self::InvalidInput { .. }
        )
    }
}
