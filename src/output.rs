//! Output formatting utilities

use crate::commands::RunSummary;
use crate::error::Result;

/// Pretty printer for batchdiff output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print the summary of a comparison run
    pub fn print_summary(summary: &RunSummary) {
        println!("🔍 batchdiff: {}", summary.tables.join(", "));
        println!("├─ Strategy: {}", summary.strategy);
        println!(
            "├─ Batches: {} ({} identical, {} rechecked)",
            summary.stats.batches, summary.report.identical, summary.report.rechecked
        );
        println!("├─ Lines compared: {}", summary.stats.lines);
        println!("├─ Elapsed: {}", format_duration(summary.elapsed_ms));

        if summary.is_success() {
            println!("└─ ✅ Tables are identical");
            return;
        }

        println!(
            "└─ ❌ {} batch(es) with differences, {} differing row(s)",
            summary.report.with_discrepancies, summary.report.discrepancies
        );
        for (i, error) in summary.stats.errors.iter().enumerate() {
            let prefix = if i == summary.stats.errors.len() - 1 {
                "   └─"
            } else {
                "   ├─"
            };
            println!("{} {}", prefix, error);
        }
        if let Some(template) = &summary.options.extract_result_to_file {
            println!();
            println!("🟡 Differing keys written to: {}", template);
        }
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    /// Format any serializable data as JSON
    pub fn format<T: serde::Serialize + ?Sized>(data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }
}

/// Format milliseconds in human-readable form
fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{} ms", ms)
    } else if ms < 60_000 {
        format!("{:.1} s", ms as f64 / 1000.0)
    } else {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}
