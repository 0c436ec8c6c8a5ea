//! Turn an ordered two-way line diff into key-addressed discrepancies

use crate::diff::DiffLine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One discrepancy between source and target, addressed by row key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffRecord {
    Changed(String),
    OnlyInSource(String),
    OnlyInTarget(String),
}

impl DiffRecord {
    pub fn classification(&self) -> &'static str {
        match self {
            DiffRecord::Changed(_) => "changed",
            DiffRecord::OnlyInSource(_) => "only_in_source",
            DiffRecord::OnlyInTarget(_) => "only_in_target",
        }
    }

    pub fn key(&self) -> &str {
        match self {
            DiffRecord::Changed(key)
            | DiffRecord::OnlyInSource(key)
            | DiffRecord::OnlyInTarget(key) => key,
        }
    }
}

impl fmt::Display for DiffRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.classification(), self.key())
    }
}

/// Extract the row key: the first tab-separated field of an extracted line
pub fn extract_key(row: &str) -> &str {
    row.split('\t').next().unwrap_or(row)
}

/// Single forward pass classifier.
///
/// Both extracts are sorted by the same key, so the old and new version of a
/// changed row show up as an adjacent `<`/`>` pair. Input that breaks this
/// ordering yields unspecified classifications.
pub struct DiffReconciler;

impl DiffReconciler {
    pub fn reconcile<'a, I>(lines: I) -> Vec<DiffRecord>
    where
        I: IntoIterator<Item = &'a DiffLine>,
    {
        let mut records: Vec<DiffRecord> = Vec::new();
        let mut last_source_key: Option<String> = None;

        for line in lines {
            match line {
                DiffLine::Removed(row) => {
                    let key = extract_key(row).to_string();
                    records.push(DiffRecord::OnlyInSource(key.clone()));
                    last_source_key = Some(key);
                }
                DiffLine::Added(row) => {
                    let key = extract_key(row).to_string();
                    if last_source_key.as_deref() == Some(key.as_str()) {
                        if let Some(last) = records.last_mut() {
                            *last = DiffRecord::Changed(key);
                        }
                    } else {
                        records.push(DiffRecord::OnlyInTarget(key.clone()));
                        last_source_key = Some(key);
                    }
                }
            }
        }

        records
    }

    /// Reconcile raw `diff` output, skipping hunk headers and separators
    pub fn parse_text(text: &str) -> Vec<DiffRecord> {
        let lines: Vec<DiffLine> = text.lines().filter_map(DiffLine::parse).collect();
        Self::reconcile(&lines)
    }

    /// Deduplicated, sorted keys touched by a set of records
    pub fn keys(records: &[DiffRecord]) -> Vec<String> {
        let keys: BTreeSet<&str> = records.iter().map(DiffRecord::key).collect();
        let mut keys: Vec<String> = keys.into_iter().map(str::to_string).collect();
        // numeric keys sort numerically so the recheck log reads naturally
        if keys.iter().all(|k| k.parse::<i64>().is_ok()) {
            keys.sort_by_key(|k| k.parse::<i64>().unwrap_or_default());
        }
        keys
    }
}
