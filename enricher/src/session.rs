//! Orchestration for `enricher run`.
//!
//! A session loads the dataset, settles the run mode (explicit flag, interactive
//! menu, or `continue`), selects the rows to process and hands them to the
//! [`RunLoop`]. Every component is injected so tests can drive a full session
//! against scripted fakes.

use std::io::IsTerminal;

use anyhow::{Context, Result};
use dialoguer::Select;
use tracing::{error, info, warn};

use crate::core::selector::{Mode, ProgressCounts, overridden_request, resolve_mode, select};
use crate::core::summary::TaskOutcome;
use crate::io::audit_log::{AuditLog, AuditSink};
use crate::io::cancel::CancelToken;
use crate::io::config::EnricherConfig;
use crate::io::table_store::{TableStore, load_dataset, open_store, save_dataset};
use crate::io::tool::{CliLookupTool, LookupTool};
use crate::io::wait::{SpinnerWaiter, Waiter};
use crate::lookup::{LookupClient, RetryPolicy};
use crate::run_loop::{LoopConfig, RunLoop, RunOutcome, TaskReport};

/// Options from the `run` command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Mode requested with `--mode`; only consulted when progress exists.
    pub mode: Option<Mode>,
    /// Never prompt; fall back to `continue`.
    pub assume_yes: bool,
}

pub struct Session<'a, T: LookupTool, W: Waiter> {
    pub config: &'a EnricherConfig,
    pub tool: &'a T,
    pub waiter: &'a W,
    pub store: &'a dyn TableStore,
    pub audit: &'a mut dyn AuditSink,
}

impl<T: LookupTool, W: Waiter> Session<'_, T, W> {
    /// Run one session.
    ///
    /// `choose` is asked for a mode only when the dataset already has progress
    /// and no mode was requested.
    pub fn run<C>(self, requested: Option<Mode>, choose: C) -> Result<RunOutcome>
    where
        C: FnOnce(&ProgressCounts) -> Result<Mode>,
    {
        let columns = self.config.columns();
        let mut dataset = load_dataset(self.store, &columns)?;
        let counts = ProgressCounts::tally(&dataset);
        info!(
            total = counts.total,
            success = counts.success,
            not_found = counts.not_found,
            pending = counts.pending,
            "dataset loaded"
        );

        let mode = match requested {
            None if counts.has_progress() => choose(&counts)?,
            _ => resolve_mode(&dataset, requested),
        };
        if let Some(ignored) = overridden_request(requested, mode) {
            warn!(requested = %ignored, %mode, "no existing progress, ignoring requested mode");
        }
        let selected = select(&mut dataset, mode)?;
        info!(%mode, selected = selected.len(), "rows selected");
        if selected.is_empty() {
            info!("nothing to process for this mode");
        }

        let client = LookupClient::new(
            self.tool,
            self.waiter,
            RetryPolicy::from_config(&self.config.lookup),
        );
        let mut run_loop = RunLoop::new(
            &client,
            self.waiter,
            self.store,
            self.audit,
            LoopConfig::from_config(self.config),
        );
        let result = run_loop.run(&mut dataset, &selected, mode, log_task);

        if let Err(err) = &result {
            error!(error = %format!("{err:#}"), "run aborted, saving progress");
            if let Err(save_err) = save_dataset(self.store, &dataset) {
                warn!(error = %format!("{save_err:#}"), "could not save progress");
            }
        }
        result
    }
}

/// Run against the configured dataset and lookup tool.
pub fn run_from_config(
    config: &EnricherConfig,
    options: RunOptions,
    token: CancelToken,
) -> Result<RunOutcome> {
    for (key, value) in config.describe() {
        info!(%key, %value, "config");
    }
    let store = open_store(&config.dataset_path, &config.sheet_name)?;
    let mut audit = AuditLog::open(&config.audit_log_path)?;
    info!(path = %audit.path().display(), "appending to audit log");
    let tool = CliLookupTool::from_config(&config.lookup);
    let waiter = SpinnerWaiter::new(token);

    let interactive = !options.assume_yes && std::io::stdin().is_terminal();
    Session {
        config,
        tool: &tool,
        waiter: &waiter,
        store: store.as_ref(),
        audit: &mut audit,
    }
    .run(options.mode, |counts| {
        if interactive {
            prompt_mode(counts)
        } else {
            info!("existing progress found, continuing");
            Ok(Mode::Continue)
        }
    })
}

const MENU: [(Mode, &str); 3] = [
    (Mode::Continue, "Continue (process empty rows and retry errors)"),
    (Mode::Restart, "Restart (clear every result and start over)"),
    (Mode::RetryNotFound, "Retry rows marked Not Found"),
];

fn prompt_mode(counts: &ProgressCounts) -> Result<Mode> {
    eprintln!(
        "Existing progress: {} found, {} not found, {} pending of {} rows.",
        counts.success, counts.not_found, counts.pending, counts.total
    );
    let items: Vec<&str> = MENU.iter().map(|(_, label)| *label).collect();
    let selection = Select::new()
        .with_prompt("How should this run proceed?")
        .items(&items)
        .default(0)
        .interact()
        .context("read run mode selection")?;
    Ok(MENU
        .get(selection)
        .map(|(mode, _)| *mode)
        .unwrap_or(Mode::Continue))
}

fn log_task(report: &TaskReport<'_>) {
    let name = report.task.display_name();
    match report.outcome {
        TaskOutcome::Success(value) => {
            info!(position = report.position, total = report.total, %name, email = %value, "done");
        }
        TaskOutcome::NotFound => {
            info!(position = report.position, total = report.total, %name, "not found");
        }
        TaskOutcome::RetryableError(kind) => {
            warn!(position = report.position, total = report.total, %name, %kind, "left for retry");
        }
        TaskOutcome::Skipped => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_loop::RunStop;
    use crate::test_support::{
        MemoryAudit, MemoryStore, RecordingWaiter, ScriptedTool, completed, table,
    };
    use anyhow::bail;

    fn quick_config() -> EnricherConfig {
        EnricherConfig {
            quota_wait_secs: 0,
            task_interval_secs: 0,
            ..EnricherConfig::default()
        }
    }

    #[test]
    fn fresh_dataset_never_asks_for_a_mode() {
        let config = quick_config();
        let store = MemoryStore::new(table(
            &["company_name", "company_name_tc", "Email"],
            &[&["Acme", "", ""]],
        ));
        let mut audit = MemoryAudit::default();
        let tool = ScriptedTool::new(vec![completed("a@x.com")]);
        let waiter = RecordingWaiter::new();

        let outcome = Session {
            config: &config,
            tool: &tool,
            waiter: &waiter,
            store: &store,
            audit: &mut audit,
        }
        .run(Some(Mode::Restart), |_| bail!("should not prompt"))
        .expect("run");

        assert_eq!(outcome.mode, Mode::Fresh);
        assert_eq!(outcome.stop, RunStop::Completed);
    }

    #[test]
    fn chooser_decides_when_progress_exists_and_no_mode_given() {
        let config = quick_config();
        let store = MemoryStore::new(table(
            &["company_name", "company_name_tc", "Email"],
            &[&["Acme", "", "Not Found"], &["Beta", "", ""]],
        ));
        let mut audit = MemoryAudit::default();
        let tool = ScriptedTool::new(vec![completed("acme@x.com")]);
        let waiter = RecordingWaiter::new();

        let outcome = Session {
            config: &config,
            tool: &tool,
            waiter: &waiter,
            store: &store,
            audit: &mut audit,
        }
        .run(None, |counts| {
            assert_eq!(counts.not_found, 1);
            assert_eq!(counts.pending, 1);
            Ok(Mode::RetryNotFound)
        })
        .expect("run");

        assert_eq!(outcome.mode, Mode::RetryNotFound);
        let saved = store.saved().expect("saved");
        assert_eq!(saved.rows[0][2], "acme@x.com");
        assert_eq!(saved.rows[1][2], "");
    }

    #[test]
    fn fatal_error_still_saves_progress() {
        let config = quick_config();
        let store = MemoryStore::new(table(
            &["company_name", "company_name_tc", "Email"],
            &[&["Acme", "", ""], &["Beta", "", ""]],
        ));
        let mut audit = MemoryAudit::default();
        // Second lookup runs out of scripted attempts and errors.
        let tool = ScriptedTool::new(vec![completed("a@x.com")]);
        let waiter = RecordingWaiter::new();

        let result = Session {
            config: &config,
            tool: &tool,
            waiter: &waiter,
            store: &store,
            audit: &mut audit,
        }
        .run(None, |_| Ok(Mode::Continue));

        assert!(result.is_err());
        let saved = store.saved().expect("saved");
        assert_eq!(saved.rows[0][2], "a@x.com");
        assert_eq!(saved.rows[1][2], "");
    }
}
