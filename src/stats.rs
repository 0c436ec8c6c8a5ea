//! Run-wide statistics shared by every batch worker

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Thread-safe accumulator for compared lines and recorded errors.
///
/// Lines, batches and errors live behind independent synchronization so a
/// worker adding lines never waits on a worker appending an error.
#[derive(Debug, Default)]
pub struct StatsCollector {
    lines: AtomicU64,
    batches: AtomicU64,
    errors: Mutex<Vec<String>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_lines(&self, lines: u64) {
        self.lines.fetch_add(lines, Ordering::Relaxed);
    }

    /// Count one finished batch, whatever its outcome
    pub fn add_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_error(&self, error: impl Into<String>) {
        let mut errors = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        errors.push(error.into());
    }

    pub fn all_lines(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    pub fn all_batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn all_errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn has_errors(&self) -> bool {
        !self
            .errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> RunStats {
        RunStats {
            lines: self.all_lines(),
            batches: self.all_batches(),
            errors: self.all_errors(),
        }
    }
}

/// Frozen view of a [`StatsCollector`] taken at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub lines: u64,
    pub batches: u64,
    pub errors: Vec<String>,
}

impl RunStats {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}
