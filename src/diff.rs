//! Line-level comparison of two ordered extracts
//!
//! Every differ returns removed/added lines interleaved so that the two
//! versions of a row sharing a key are adjacent, which is what
//! [`crate::reconcile::DiffReconciler`] relies on.

use crate::error::{BatchDiffError, Result};
use crate::reconcile::extract_key;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;

/// One side-specific line of a two-way diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    /// Present in the source extract only (`< ` in diff output)
    Removed(String),
    /// Present in the target extract only (`> ` in diff output)
    Added(String),
}

impl DiffLine {
    /// Parse one line of normal-format `diff` output
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(row) = line.strip_prefix("< ") {
            Some(DiffLine::Removed(row.to_string()))
        } else {
            line.strip_prefix("> ")
                .map(|row| DiffLine::Added(row.to_string()))
        }
    }
}

impl std::fmt::Display for DiffLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffLine::Removed(row) => write!(f, "< {}", row),
            DiffLine::Added(row) => write!(f, "> {}", row),
        }
    }
}

/// Result of comparing one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOutput {
    pub lines: Vec<DiffLine>,
    /// Number of lines in the source extract
    pub source_lines: u64,
}

impl DiffOutput {
    pub fn is_identical(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn to_text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Collaborator computing the two-way diff of two ordered line sequences
pub trait LineDiffer: Send + Sync {
    fn diff(&self, source: &[String], target: &[String]) -> Result<DiffOutput>;
}

/// In-process differ for key-sorted extracts.
///
/// Lines are matched as a multiset, which for extracts sorted on a unique key
/// gives the same removed/added lines as `diff(1)` in linear time.
#[derive(Debug, Default, Clone)]
pub struct InProcessDiff;

impl LineDiffer for InProcessDiff {
    fn diff(&self, source: &[String], target: &[String]) -> Result<DiffOutput> {
        let mut target_left: HashMap<&str, usize> = HashMap::new();
        for line in target {
            *target_left.entry(line.as_str()).or_insert(0) += 1;
        }

        let mut removed = Vec::new();
        for line in source {
            match target_left.get_mut(line.as_str()) {
                Some(count) if *count > 0 => *count -= 1,
                _ => removed.push(line.clone()),
            }
        }

        let mut source_left: HashMap<&str, usize> = HashMap::new();
        for line in source {
            *source_left.entry(line.as_str()).or_insert(0) += 1;
        }

        let mut added = Vec::new();
        for line in target {
            match source_left.get_mut(line.as_str()) {
                Some(count) if *count > 0 => *count -= 1,
                _ => added.push(line.clone()),
            }
        }

        Ok(DiffOutput {
            lines: interleave(removed, added),
            source_lines: source.len() as u64,
        })
    }
}

/// Differ delegating to an external `diff` program
#[derive(Debug, Clone)]
pub struct CommandDiff {
    program: PathBuf,
    tmp_dir: Option<PathBuf>,
}

impl CommandDiff {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            tmp_dir: None,
        }
    }

    /// Directory for the extract files handed to the program
    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(dir.into());
        self
    }

    fn write_extract(&self, prefix: &str, lines: &[String]) -> Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        let mut file = match &self.tmp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        for line in lines {
            writeln!(file, "{}", line)?;
        }
        file.flush()?;
        Ok(file)
    }

    fn run(&self, source: &Path, target: &Path) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--speed-large-files")
            .arg(source)
            .arg(target)
            .output()
            .map_err(|e| {
                BatchDiffError::diff(format!(
                    "Failed to run '{}': {}",
                    self.program.display(),
                    e
                ))
            })?;

        // diff exits 0 for identical input, 1 for differences, >1 on trouble
        match output.status.code() {
            Some(0) | Some(1) => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
            _ => Err(BatchDiffError::diff(format!(
                "'{}' failed ({}): {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

impl LineDiffer for CommandDiff {
    fn diff(&self, source: &[String], target: &[String]) -> Result<DiffOutput> {
        // both files are removed when dropped, on every exit path
        let source_file = self.write_extract("batchdiff_src_", source)?;
        let target_file = self.write_extract("batchdiff_target_", target)?;

        let text = self.run(source_file.path(), target_file.path())?;

        let mut removed = Vec::new();
        let mut added = Vec::new();
        for line in text.lines().filter_map(DiffLine::parse) {
            match line {
                DiffLine::Removed(row) => removed.push(row),
                DiffLine::Added(row) => added.push(row),
            }
        }

        Ok(DiffOutput {
            lines: interleave(removed, added),
            source_lines: source.len() as u64,
        })
    }
}

/// Merge removed and added lines, each in extract order, into one sequence
/// where rows sharing a key form an adjacent `Removed`/`Added` pair.
///
/// When the heads differ and the removed key shows up later among the added
/// lines, the added head sorts first and is emitted first.
pub fn interleave(removed: Vec<String>, added: Vec<String>) -> Vec<DiffLine> {
    let mut added_left: HashMap<String, usize> = HashMap::new();
    for row in &added {
        *added_left.entry(extract_key(row).to_string()).or_insert(0) += 1;
    }

    let mut lines = Vec::with_capacity(removed.len() + added.len());
    let mut removed = removed.into_iter().peekable();
    let mut added = added.into_iter().peekable();

    loop {
        let heads = match (removed.peek(), added.peek()) {
            (Some(r), Some(a)) => Some((extract_key(r).to_string(), extract_key(a).to_string())),
            _ => None,
        };
        let Some((source_key, target_key)) = heads else {
            // at most one side has lines left
            lines.extend(removed.map(DiffLine::Removed));
            lines.extend(added.map(DiffLine::Added));
            break;
        };

        let pending = added_left.get(&source_key).copied().unwrap_or(0);
        if source_key == target_key {
            if let (Some(r), Some(a)) = (removed.next(), added.next()) {
                lines.push(DiffLine::Removed(r));
                lines.push(DiffLine::Added(a));
            }
            consume(&mut added_left, &target_key);
        } else if pending > 0 {
            if let Some(a) = added.next() {
                lines.push(DiffLine::Added(a));
            }
            consume(&mut added_left, &target_key);
        } else if let Some(r) = removed.next() {
            lines.push(DiffLine::Removed(r));
        }
    }

    lines
}

fn consume(counts: &mut HashMap<String, usize>, key: &str) {
    if let Some(count) = counts.get_mut(key) {
        *count = count.saturating_sub(1);
    }
}
