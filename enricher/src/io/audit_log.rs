//! Append-only audit log of runs.
//!
//! Unlike console tracing, the audit log is a product artifact: it keeps the run
//! boundaries, every row that came back `Not Found`, and the end-of-run tallies.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use crate::core::selector::Mode;
use crate::core::summary::RunCounters;

const RULE: &str = "======================================================================";

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEntry {
    RunStarted {
        mode: Mode,
        selected: usize,
        total_rows: usize,
    },
    NotFound {
        name: String,
    },
    RunFinished {
        /// How the run ended (`completed`, `cancelled`, ...).
        stop: String,
        total_rows: usize,
        counters: RunCounters,
    },
    /// Closes a started run that ended on a fatal error.
    RunAborted {
        error: String,
    },
}

pub trait AuditSink {
    fn record(&mut self, entry: AuditEntry) -> Result<()>;
}

/// File-backed audit log opened in append mode.
pub struct AuditLog {
    path: PathBuf,
    file: File,
}

impl AuditLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create audit log dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open audit log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for AuditLog {
    fn record(&mut self, entry: AuditEntry) -> Result<()> {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let text = render_entry(&now, &entry);
        self.file
            .write_all(text.as_bytes())
            .and_then(|()| self.file.flush())
            .with_context(|| format!("write audit log {}", self.path.display()))
    }
}

fn render_entry(timestamp: &str, entry: &AuditEntry) -> String {
    match entry {
        AuditEntry::RunStarted {
            mode,
            selected,
            total_rows,
        } => format!(
            "{RULE}\n{timestamp} run started (mode: {mode}, selected: {selected} of {total_rows})\n{RULE}\n"
        ),
        AuditEntry::NotFound { name } => format!("{timestamp} not found: {name}\n"),
        AuditEntry::RunFinished {
            stop,
            total_rows,
            counters,
        } => format!(
            "{RULE}\n{timestamp} run {stop}\n  rows in dataset: {total_rows}\n  selected this run: {}\n  success: {}\n  not found: {}\n  retryable errors: {}\n  skipped: {}\n{RULE}\n",
            counters.selected,
            counters.success,
            counters.not_found,
            counters.retryable,
            counters.skipped,
        ),
        AuditEntry::RunAborted { error } => {
            format!("{RULE}\n{timestamp} run aborted: {error}\n{RULE}\n")
        }
    }
}
