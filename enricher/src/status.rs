//! Read-only reports: `enricher status` and the end-of-run summary.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::selector::ProgressCounts;
use crate::io::config::EnricherConfig;
use crate::io::table_store::{TableStore, load_dataset, open_store};
use crate::run_loop::RunOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub dataset: PathBuf,
    #[serde(flatten)]
    pub counts: ProgressCounts,
}

/// Tally the configured dataset without modifying it.
pub fn read_status(config: &EnricherConfig) -> Result<StatusReport> {
    let store = open_store(&config.dataset_path, &config.sheet_name)?;
    status_from_store(store.as_ref(), config)
}

pub fn status_from_store(store: &dyn TableStore, config: &EnricherConfig) -> Result<StatusReport> {
    let dataset = load_dataset(store, &config.columns())?;
    Ok(StatusReport {
        dataset: config.dataset_path.clone(),
        counts: ProgressCounts::tally(&dataset),
    })
}

pub fn render_status(report: &StatusReport) -> String {
    let counts = &report.counts;
    format!(
        "dataset: {}\nrows: {}\nfound: {}\nnot found: {}\npending: {}\n",
        report.dataset.display(),
        counts.total,
        counts.success,
        counts.not_found,
        counts.pending
    )
}

pub fn render_status_json(report: &StatusReport) -> Result<String> {
    let mut buf = serde_json::to_string_pretty(report).context("serialize status")?;
    buf.push('\n');
    Ok(buf)
}

/// End-of-run summary block.
pub fn render_summary(outcome: &RunOutcome) -> String {
    let counters = &outcome.counters;
    let mut out = String::new();
    let _ = writeln!(out, "run {} (mode: {})", outcome.stop.label(), outcome.mode);
    let _ = writeln!(
        out,
        "  started:  {}",
        outcome.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(
        out,
        "  finished: {}",
        outcome.finished_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "  rows in dataset:   {}", outcome.total_rows);
    let _ = writeln!(out, "  selected this run: {}", counters.selected);
    let _ = writeln!(out, "  success:           {}", counters.success);
    let _ = writeln!(out, "  not found:         {}", counters.not_found);
    if counters.retryable > 0 {
        let _ = writeln!(out, "  left for retry:    {}", counters.retryable);
    }
    if counters.skipped > 0 {
        let _ = writeln!(out, "  skipped (no name): {}", counters.skipped);
    }
    out
}
