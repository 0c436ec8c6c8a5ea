//! # batchdiff
//!
//! Verifies that a source and a target table hold the same rows by cutting
//! the key space into batches, extracting each batch from both sides in key
//! order and reconciling the line diff into per-key discrepancies.

pub mod cli;
pub mod commands;
pub mod comparer;
pub mod config;
pub mod database;
pub mod diff;
pub mod error;
pub mod executor;
pub mod extract;
pub mod output;
pub mod progress;
pub mod reconcile;
pub mod stats;
pub mod strategy;

pub use comparer::{CompareContext, TableComparer};
pub use config::CompareOptions;
pub use error::{BatchDiffError, Result};
pub use executor::ParallelExecutor;
pub use reconcile::{DiffRecord, DiffReconciler};
pub use stats::StatsCollector;
pub use strategy::{Batch, BatchStrategy, StrategyKind};
