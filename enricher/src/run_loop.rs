//! Sequential, checkpointed processing of the selected tasks.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use tracing::{error, info, instrument, warn};

use crate::core::result_state::ResultState;
use crate::core::selector::Mode;
use crate::core::summary::{RunCounters, TaskOutcome};
use crate::dataset::{Dataset, Task};
use crate::io::audit_log::{AuditEntry, AuditSink};
use crate::io::config::EnricherConfig;
use crate::io::table_store::{TableStore, save_dataset};
use crate::io::tool::LookupTool;
use crate::io::wait::{WaitReason, Waiter};
use crate::lookup::{LookupClient, LookupError, LookupOutcome};

/// Run-level pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    pub quota_wait: Duration,
    /// `None` keeps waiting on quota exhaustion until cancelled.
    pub max_quota_waits: Option<u32>,
    pub task_interval: Duration,
}

impl LoopConfig {
    pub fn from_config(cfg: &EnricherConfig) -> Self {
        Self {
            quota_wait: cfg.quota_wait(),
            max_quota_waits: cfg.max_quota_waits,
            task_interval: cfg.task_interval(),
        }
    }
}

/// Reason why [`RunLoop::run`] stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStop {
    /// Every selected task was processed.
    Completed,
    /// Interrupted; progress so far was saved.
    Cancelled,
    /// The configured quota-wait bound was reached on one task.
    QuotaExhausted { index: usize, waits: u32 },
}

impl RunStop {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::QuotaExhausted { .. } => "stopped (quota wait limit reached)",
        }
    }
}

/// Summary of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub mode: Mode,
    pub stop: RunStop,
    pub counters: RunCounters,
    pub total_rows: usize,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

/// Passed to the `on_task` observer after each task.
#[derive(Debug)]
pub struct TaskReport<'a> {
    /// 1-based position within this run's selection.
    pub position: usize,
    pub total: usize,
    pub task: &'a Task,
    pub outcome: &'a TaskOutcome,
}

enum QuotaResult {
    Outcome(LookupOutcome),
    Cancelled,
    Exhausted { waits: u32 },
}

pub struct RunLoop<'a, T: LookupTool, W: Waiter> {
    client: &'a LookupClient<'a, T, W>,
    waiter: &'a W,
    store: &'a dyn TableStore,
    audit: &'a mut dyn AuditSink,
    config: LoopConfig,
}

impl<'a, T: LookupTool, W: Waiter> RunLoop<'a, T, W> {
    pub fn new(
        client: &'a LookupClient<'a, T, W>,
        waiter: &'a W,
        store: &'a dyn TableStore,
        audit: &'a mut dyn AuditSink,
        config: LoopConfig,
    ) -> Self {
        Self {
            client,
            waiter,
            store,
            audit,
            config,
        }
    }

    /// Process `selected` rows in order, saving the dataset after each one.
    ///
    /// Returns `Ok` on completion, cancellation, or an exhausted quota-wait bound.
    /// Fatal conditions (missing tool, storage failure) are returned as errors and
    /// close the audit run as aborted; the caller is responsible for a best-effort
    /// save in that case.
    #[instrument(skip_all, fields(%mode, selected = selected.len()))]
    pub fn run<F: FnMut(&TaskReport<'_>)>(
        &mut self,
        dataset: &mut Dataset,
        selected: &[usize],
        mode: Mode,
        on_task: F,
    ) -> Result<RunOutcome> {
        self.audit.record(AuditEntry::RunStarted {
            mode,
            selected: selected.len(),
            total_rows: dataset.len(),
        })?;

        let result = self.process(dataset, selected, mode, on_task);
        if let Err(err) = &result {
            let entry = AuditEntry::RunAborted {
                error: format!("{err:#}"),
            };
            if let Err(audit_err) = self.audit.record(entry) {
                warn!(error = %format!("{audit_err:#}"), "could not record aborted run");
            }
        }
        result
    }

    fn process<F: FnMut(&TaskReport<'_>)>(
        &mut self,
        dataset: &mut Dataset,
        selected: &[usize],
        mode: Mode,
        mut on_task: F,
    ) -> Result<RunOutcome> {
        let total = selected.len();
        let started_at = Local::now();
        let mut counters = RunCounters::new(total);

        for (offset, &index) in selected.iter().enumerate() {
            let position = offset + 1;
            if self.waiter.check().is_err() {
                return self.finish(dataset, mode, RunStop::Cancelled, counters, started_at);
            }

            let task = dataset
                .task(index)
                .ok_or_else(|| anyhow!("selected row {index} is out of range"))?;

            if !task.has_name() {
                info!(position, total, row = index, "skipping row without a name");
                let outcome = TaskOutcome::Skipped;
                counters.observe(&outcome);
                on_task(&TaskReport {
                    position,
                    total,
                    task: &task,
                    outcome: &outcome,
                });
                continue;
            }

            let name = task.display_name();
            info!(position, total, row = index, %name, "processing");

            let lookup = match self.lookup_through_quota(&task)? {
                QuotaResult::Outcome(outcome) => outcome,
                QuotaResult::Cancelled => {
                    return self.finish(dataset, mode, RunStop::Cancelled, counters, started_at);
                }
                QuotaResult::Exhausted { waits } => {
                    let stop = RunStop::QuotaExhausted { index, waits };
                    return self.finish(dataset, mode, stop, counters, started_at);
                }
            };

            let state = match &lookup {
                LookupOutcome::Success(value) => {
                    info!(%name, email = %value, "email found");
                    ResultState::Success(value.clone())
                }
                LookupOutcome::NotFound => {
                    info!(%name, "no email found");
                    self.audit.record(AuditEntry::NotFound { name: name.clone() })?;
                    ResultState::NotFound
                }
                LookupOutcome::RetryableError(kind) => {
                    warn!(%name, %kind, "lookup error, row left for a later run");
                    ResultState::RetryableError(*kind)
                }
            };
            dataset.set_result(index, &state)?;

            let outcome = TaskOutcome::from(lookup);
            counters.observe(&outcome);
            save_dataset(self.store, dataset)
                .with_context(|| format!("save checkpoint after row {index}"))?;
            on_task(&TaskReport {
                position,
                total,
                task: &task,
                outcome: &outcome,
            });

            if position < total
                && self
                    .waiter
                    .wait(
                        self.config.task_interval,
                        WaitReason::TaskInterval,
                        "waiting before next task",
                    )
                    .is_err()
            {
                return self.finish(dataset, mode, RunStop::Cancelled, counters, started_at);
            }
        }

        self.finish(dataset, mode, RunStop::Completed, counters, started_at)
    }

    /// Reattempt the same task while the quota is exhausted.
    fn lookup_through_quota(&self, task: &Task) -> Result<QuotaResult> {
        let mut waits = 0u32;
        loop {
            match self.client.lookup(&task.primary, &task.secondary) {
                Ok(outcome) => {
                    if waits > 0 {
                        info!(waits, "quota restored, continuing");
                    }
                    return Ok(QuotaResult::Outcome(outcome));
                }
                Err(LookupError::QuotaExceeded) => {
                    if let Some(max) = self.config.max_quota_waits
                        && waits >= max
                    {
                        error!(waits, "quota still exhausted, giving up for this run");
                        return Ok(QuotaResult::Exhausted { waits });
                    }
                    waits += 1;
                    warn!(
                        wait_mins = self.config.quota_wait.as_secs() / 60,
                        waits,
                        "lookup quota exhausted, waiting before retrying the same row (Ctrl-C to stop)"
                    );
                    let message = format!(
                        "quota exhausted, waiting {} min",
                        self.config.quota_wait.as_secs() / 60
                    );
                    if self
                        .waiter
                        .wait(self.config.quota_wait, WaitReason::Quota, &message)
                        .is_err()
                    {
                        return Ok(QuotaResult::Cancelled);
                    }
                }
                Err(LookupError::Cancelled(_)) => return Ok(QuotaResult::Cancelled),
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn finish(
        &mut self,
        dataset: &Dataset,
        mode: Mode,
        stop: RunStop,
        counters: RunCounters,
        started_at: DateTime<Local>,
    ) -> Result<RunOutcome> {
        save_dataset(self.store, dataset).context("save dataset at end of run")?;
        let processed = counters.processed();
        match &stop {
            RunStop::Completed => info!(
                processed,
                success = counters.success,
                not_found = counters.not_found,
                "all selected rows processed"
            ),
            RunStop::Cancelled => info!(
                processed,
                selected = counters.selected,
                "run interrupted, progress saved"
            ),
            RunStop::QuotaExhausted { index, waits } => {
                warn!(row = index, waits, processed, "run stopped on quota, progress saved");
            }
        }
        self.audit.record(AuditEntry::RunFinished {
            stop: stop.label().to_string(),
            total_rows: dataset.len(),
            counters,
        })?;
        Ok(RunOutcome {
            mode,
            stop,
            counters,
            total_rows: dataset.len(),
            started_at,
            finished_at: Local::now(),
        })
    }
}
