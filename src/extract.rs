//! Persistence of classified discrepancies, one file per table

use crate::config::TABLE_PLACEHOLDER;
use crate::error::Result;
use crate::reconcile::DiffRecord;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// Appends `<classification>: <key>` lines to the result file of a table.
///
/// The file is removed when the extractor is created, so a run never mixes
/// its results with a previous one, and only comes back into existence once a
/// discrepancy is written.
#[derive(Debug)]
pub struct ResultExtractor {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ResultExtractor {
    /// Resolve `template` for `table` and clear any previous result file
    pub fn create(template: &str, table: &str) -> Result<Self> {
        let path = PathBuf::from(template.replace(TABLE_PLACEHOLDER, table));
        match fs::remove_file(&path) {
            Ok(()) => log::debug!("[{}] Removed previous result file {}", table, path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn extract(&self, records: &[DiffRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&record.to_string());
            buffer.push('\n');
        }

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buffer.as_bytes())?;
        Ok(())
    }
}
