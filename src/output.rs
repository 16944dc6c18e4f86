//! CLI output formatting for a run.
//!
//! # Output Format
//!
//! ```text
//! Run 2410181430
//!     Sources: 3
//!     Registry: refreshed (3 sources)
//!     Indexed: 41 artifacts
//!
//! Fetch
//!     WA1X      new        WA1X.2410181430.3f9a0c12be.jpg
//!     K4RCG     duplicate  K4RCG.2410181430.77e01b9d2c.png
//!     VE7IGP    failed     request timed out
//!         thumbnail failed: Failed to decode ...
//!
//! Derive
//!     3 averages written
//!
//! Sweep
//!     data: 3 deleted, 38 kept
//!
//! 1 new, 1 duplicate, 1 failed, 3 expired
//! ```
//!
//! A throttled run prints the `Run` block and a `Skipped` line instead of
//! the fetch and derive sections.
//!
//! # Architecture
//!
//! `format_run_report` returns `Vec<String>` for testability and
//! `print_run_report` writes it to stdout. Format functions are pure.

use crate::fetch::GrabOutcome;
use crate::pipeline::{RunReport, SourceOutcome, ThrottleDecision};
use std::path::Path;

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Width of the source ID column, from the longest ID.
fn id_width(outcomes: &[SourceOutcome]) -> usize {
    outcomes
        .iter()
        .map(|o| o.grab.source_id.len())
        .max()
        .unwrap_or(0)
}

fn outcome_lines(outcome: &SourceOutcome, width: usize) -> Vec<String> {
    let grab = &outcome.grab;
    let (label, detail) = match &grab.outcome {
        GrabOutcome::New => ("new", grab.artifact.as_deref().map(file_name)),
        GrabOutcome::Duplicate => ("duplicate", grab.artifact.as_deref().map(file_name)),
        GrabOutcome::Failed(reason) => ("failed", Some(reason.clone())),
    };
    let mut lines = vec![format!(
        "    {:<width$}  {:<9}  {}",
        grab.source_id,
        label,
        detail.unwrap_or_default()
    )
    .trim_end()
    .to_string()];
    if let Some(Err(e)) = &outcome.thumbnail {
        lines.push(format!("        thumbnail failed: {e}"));
    }
    lines
}

/// Format a run report as display lines.
pub fn format_run_report(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::new();

    let mode = match (report.options.test, report.options.force) {
        (true, _) => " (test mode)",
        (false, true) => " (forced)",
        (false, false) => "",
    };
    lines.push(format!("Run {}{}", report.bucket, mode));
    lines.push(format!("    Sources: {}", report.sources));
    match &report.registry_refresh {
        Some(Ok(n)) => lines.push(format!("    Registry: refreshed ({n} sources)")),
        Some(Err(e)) => lines.push(format!("    Registry: refresh failed ({e})")),
        None => {}
    }
    lines.push(format!("    Indexed: {} artifacts", report.indexed));

    if let Some(ThrottleDecision::Skip { latest }) = report.throttle {
        lines.push(format!("    Skipped: bucket {latest} already ran"));
    }

    if !report.outcomes.is_empty() {
        lines.push(String::new());
        lines.push("Fetch".to_string());
        let width = id_width(&report.outcomes);
        for outcome in &report.outcomes {
            lines.extend(outcome_lines(outcome, width));
        }
    }

    if !report.averages.is_empty() || !report.derive_failures.is_empty() {
        lines.push(String::new());
        lines.push("Derive".to_string());
        if !report.averages.is_empty() {
            lines.push(format!("    {} averages written", report.averages.len()));
        }
        for (id, e) in &report.derive_failures {
            lines.push(format!("    {id}: average failed: {e}"));
        }
    }

    let active_sweeps: Vec<_> = report
        .sweeps
        .iter()
        .filter(|s| !s.deleted.is_empty() || !s.failed.is_empty())
        .collect();
    if !active_sweeps.is_empty() {
        lines.push(String::new());
        lines.push("Sweep".to_string());
        for sweep in active_sweeps {
            lines.push(format!("    {sweep}"));
        }
    }

    if !report.persist_errors.is_empty() {
        lines.push(String::new());
        lines.push("Persist".to_string());
        for e in &report.persist_errors {
            lines.push(format!("    {e}"));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "{} new, {} duplicate, {} failed, {} expired",
        report.new_count(),
        report.duplicate_count(),
        report.failed_count(),
        report.deleted_count()
    ));
    lines
}

/// Print a run report to stdout.
pub fn print_run_report(report: &RunReport) {
    for line in format_run_report(report) {
        println!("{}", line);
    }
}
