//! Test-only fixtures and scripted fakes for the tool, waiter, store and audit seams.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::dataset::{Columns, Dataset, Table};
use crate::io::audit_log::{AuditEntry, AuditSink};
use crate::io::cancel::Cancelled;
use crate::io::process::ProgramNotFound;
use crate::io::table_store::{CsvStore, TableStore};
use crate::io::tool::{Attempt, LookupTool};
use crate::io::wait::{WaitReason, Waiter};

/// Build a table from string literals.
pub fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
    Table::new(
        headers.iter().map(|h| (*h).to_string()).collect(),
        rows.iter()
            .map(|row| row.iter().map(|c| (*c).to_string()).collect())
            .collect(),
    )
}

/// Default column names.
pub fn columns() -> Columns {
    Columns {
        primary: "company_name".to_string(),
        secondary: "company_name_tc".to_string(),
        result: "Email".to_string(),
    }
}

/// Dataset with one named company per entry of `results`, in order.
pub fn dataset_with_results(results: &[&str]) -> Dataset {
    let rows: Vec<Vec<String>> = results
        .iter()
        .enumerate()
        .map(|(i, result)| vec![format!("Company {i}"), String::new(), (*result).to_string()])
        .collect();
    let table = Table::new(
        vec![
            "company_name".to_string(),
            "company_name_tc".to_string(),
            "Email".to_string(),
        ],
        rows,
    );
    Dataset::from_table(table, &columns())
}

pub fn completed(stdout: &str) -> Attempt {
    Attempt::Completed {
        stdout: stdout.to_string(),
    }
}

pub fn failed(diagnostic: &str) -> Attempt {
    Attempt::Failed {
        exit_code: Some(1),
        diagnostic: diagnostic.to_string(),
    }
}

pub fn timed_out() -> Attempt {
    Attempt::TimedOut
}

/// Tool that replays predetermined attempts in order.
pub struct ScriptedTool {
    attempts: RefCell<VecDeque<Attempt>>,
    missing: Option<String>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedTool {
    pub fn new(attempts: Vec<Attempt>) -> Self {
        Self {
            attempts: RefCell::new(attempts.into()),
            missing: None,
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Tool whose executable is not installed.
    pub fn missing(program: &str) -> Self {
        Self {
            missing: Some(program.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl LookupTool for ScriptedTool {
    fn invoke(&self, prompt: &str, _timeout: Duration) -> Result<Attempt> {
        if let Some(program) = &self.missing {
            return Err(ProgramNotFound {
                program: program.clone(),
            }
            .into());
        }
        self.prompts.borrow_mut().push(prompt.to_string());
        self.attempts
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted tool ran out of attempts"))
    }
}

/// Waiter that records waits instead of sleeping.
#[derive(Default)]
pub struct RecordingWaiter {
    waits: RefCell<Vec<(Duration, WaitReason)>>,
    cancel_on: Option<usize>,
    cancelled: Cell<bool>,
}

impl RecordingWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report cancellation on the `n`th wait (1-based) and every check after it.
    pub fn cancel_on_wait(n: usize) -> Self {
        Self {
            cancel_on: Some(n),
            ..Self::default()
        }
    }

    pub fn waits(&self) -> Vec<(Duration, WaitReason)> {
        self.waits.borrow().clone()
    }

    pub fn count(&self, reason: WaitReason) -> usize {
        self.waits.borrow().iter().filter(|(_, r)| *r == reason).count()
    }
}

impl Waiter for RecordingWaiter {
    fn wait(&self, duration: Duration, reason: WaitReason, _message: &str) -> Result<(), Cancelled> {
        self.check()?;
        let mut waits = self.waits.borrow_mut();
        waits.push((duration, reason));
        if self.cancel_on == Some(waits.len()) {
            self.cancelled.set(true);
            return Err(Cancelled);
        }
        Ok(())
    }

    fn check(&self) -> Result<(), Cancelled> {
        if self.cancelled.get() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// In-memory table store counting saves.
pub struct MemoryStore {
    initial: Table,
    saved: RefCell<Option<Table>>,
    saves: Cell<usize>,
}

impl MemoryStore {
    pub fn new(initial: Table) -> Self {
        Self {
            initial,
            saved: RefCell::new(None),
            saves: Cell::new(0),
        }
    }

    /// Most recently saved table.
    pub fn saved(&self) -> Option<Table> {
        self.saved.borrow().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.get()
    }
}

impl TableStore for MemoryStore {
    fn load(&self) -> Result<Table> {
        Ok(self.saved().unwrap_or_else(|| self.initial.clone()))
    }

    fn save(&self, table: &Table) -> Result<()> {
        *self.saved.borrow_mut() = Some(table.clone());
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAudit {
    entries: Vec<AuditEntry>,
}

impl MemoryAudit {
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }
}

impl AuditSink for MemoryAudit {
    fn record(&mut self, entry: AuditEntry) -> Result<()> {
        self.entries.push(entry);
        Ok(())
    }
}

/// Temporary directory holding a CSV dataset.
pub struct CsvFixture {
    _dir: TempDir,
    path: PathBuf,
}

impl CsvFixture {
    pub fn new(contents: &Table) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("companies.csv");
        CsvStore::new(&path).save(contents)?;
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> CsvStore {
        CsvStore::new(&self.path)
    }

    pub fn read(&self) -> Result<Table> {
        self.store().load()
    }
}
