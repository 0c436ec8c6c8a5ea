//! Progress reporting utilities

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter for a comparison run
#[derive(Debug)]
pub struct ProgressReporter {
    pub planning_pb: Option<ProgressBar>,
    pub batches_pb: Option<ProgressBar>,
    show_progress: bool,
}

impl ProgressReporter {
    /// Reporter showing a spinner while batches are planned
    pub fn new() -> Self {
        Self {
            planning_pb: Some(create_spinner("Planning batches...")),
            batches_pb: None,
            show_progress: true,
        }
    }

    /// Create minimal progress reporter (no progress bars)
    pub fn new_minimal() -> Self {
        Self {
            planning_pb: None,
            batches_pb: None,
            show_progress: false,
        }
    }

    pub fn update_planning(&self, message: &str) {
        if let Some(pb) = &self.planning_pb {
            pb.set_message(message.to_string());
        }
    }

    /// Finish planning and switch to the batch bar
    pub fn start_batches(&mut self, total: u64) {
        if let Some(pb) = self.planning_pb.take() {
            pb.finish_and_clear();
        }
        if self.show_progress {
            self.batches_pb = Some(create_progress_bar(total, "batches"));
        }
    }

    /// Count one finished batch
    pub fn inc(&self) {
        if let Some(pb) = &self.batches_pb {
            pb.inc(1);
        }
    }

    pub fn finish(&mut self, message: &str) {
        if let Some(pb) = self.planning_pb.take() {
            pb.finish_and_clear();
        }
        if let Some(pb) = self.batches_pb.take() {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new_minimal()
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        // Ensure all progress bars are cleaned up silently
        if let Some(pb) = self.planning_pb.take() {
            pb.finish_and_clear();
        }
        if let Some(pb) = self.batches_pb.take() {
            pb.finish_and_clear();
        }
    }
}

/// Create a spinner progress bar
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a progress bar with known total
fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} ({per_sec}) {eta} {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb
}
