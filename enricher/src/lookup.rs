//! Lookup client: one email lookup with bounded local retry.
//!
//! Each call to [`LookupClient::lookup`] renders the prompt once and invokes the
//! tool up to `max_attempts` times. Transient faults and timeouts are retried
//! after a fixed delay; quota exhaustion is returned immediately as
//! [`LookupError::QuotaExceeded`] so the run loop can wait it out. The attempt
//! budget belongs to a single call and is never shared across tasks.

use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::core::classifier::{Answer, FailureClass, classify_failure, extract_answer};
use crate::core::result_state::{ErrorKind, ResultState};
use crate::core::summary::TaskOutcome;
use crate::io::cancel::Cancelled;
use crate::io::config::LookupConfig;
use crate::io::process::ProgramNotFound;
use crate::io::prompt::PromptEngine;
use crate::io::tool::{Attempt, LookupTool};
use crate::io::wait::{WaitReason, Waiter};

/// Terminal result of one lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Success(String),
    NotFound,
    RetryableError(ErrorKind),
}

impl From<LookupOutcome> for TaskOutcome {
    fn from(outcome: LookupOutcome) -> Self {
        match outcome {
            LookupOutcome::Success(value) => TaskOutcome::Success(value),
            LookupOutcome::NotFound => TaskOutcome::NotFound,
            LookupOutcome::RetryableError(kind) => TaskOutcome::RetryableError(kind),
        }
    }
}

/// Conditions that escape the per-call retry loop.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The tool reported its usage allowance is depleted.
    #[error("lookup quota exhausted")]
    QuotaExceeded,
    /// The tool executable is not installed. Fatal for the whole process.
    #[error("lookup tool {program:?} not found; install it and make sure it is on PATH")]
    ToolMissing { program: String },
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Per-call retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &LookupConfig) -> Self {
        Self {
            max_attempts: cfg.max_call_attempts,
            retry_delay: cfg.call_retry_delay(),
            call_timeout: cfg.call_timeout(),
        }
    }
}

pub struct LookupClient<'a, T: LookupTool, W: Waiter> {
    tool: &'a T,
    waiter: &'a W,
    prompts: PromptEngine,
    policy: RetryPolicy,
}

impl<'a, T: LookupTool, W: Waiter> LookupClient<'a, T, W> {
    pub fn new(tool: &'a T, waiter: &'a W, policy: RetryPolicy) -> Self {
        Self {
            tool,
            waiter,
            prompts: PromptEngine::new(),
            policy,
        }
    }

    /// Look up the email for one company.
    #[instrument(skip_all)]
    pub fn lookup(&self, primary: &str, secondary: &str) -> Result<LookupOutcome, LookupError> {
        let prompt = self.prompts.render_lookup(primary, secondary)?;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let last = attempt >= max_attempts;
            let result = self
                .tool
                .invoke(&prompt, self.policy.call_timeout)
                .map_err(|err| match err.downcast_ref::<ProgramNotFound>() {
                    Some(missing) => LookupError::ToolMissing {
                        program: missing.program.clone(),
                    },
                    None => LookupError::Other(err),
                })?;

            match result {
                Attempt::Completed { stdout } => {
                    let outcome = match extract_answer(&stdout) {
                        Answer::Value(value) => match ResultState::parse(&value) {
                            ResultState::Success(value) => LookupOutcome::Success(value),
                            // An answer that reads back as a sentinel must not be stored as an email.
                            _ => {
                                warn!(answer = %value, "lookup tool answered with an error line");
                                LookupOutcome::RetryableError(ErrorKind::CallFailed)
                            }
                        },
                        Answer::NotFound => LookupOutcome::NotFound,
                        Answer::Empty => {
                            warn!("lookup tool produced no output");
                            LookupOutcome::RetryableError(ErrorKind::NoOutput)
                        }
                    };
                    debug!(attempt, ?outcome, "lookup completed");
                    return Ok(outcome);
                }
                Attempt::Failed {
                    exit_code,
                    diagnostic,
                } => match classify_failure(&diagnostic) {
                    FailureClass::Quota => {
                        warn!(?exit_code, "lookup quota exhausted");
                        return Err(LookupError::QuotaExceeded);
                    }
                    FailureClass::Permanent => {
                        error!(?exit_code, %diagnostic, "lookup failed");
                        return Ok(LookupOutcome::RetryableError(ErrorKind::CallFailed));
                    }
                    FailureClass::Transient if last => {
                        error!(
                            attempts = max_attempts,
                            %diagnostic,
                            "lookup failed after max attempts, skipping row"
                        );
                        return Ok(LookupOutcome::RetryableError(ErrorKind::CallFailed));
                    }
                    FailureClass::Transient => {
                        warn!(attempt, max_attempts, %diagnostic, "transient lookup error");
                    }
                },
                Attempt::TimedOut if last => {
                    error!(
                        attempts = max_attempts,
                        timeout_secs = self.policy.call_timeout.as_secs(),
                        "lookup timed out on every attempt, skipping row"
                    );
                    return Ok(LookupOutcome::RetryableError(ErrorKind::Timeout));
                }
                Attempt::TimedOut => {
                    warn!(attempt, max_attempts, "lookup timed out");
                }
            }

            attempt += 1;
            info!(
                delay_secs = self.policy.retry_delay.as_secs(),
                attempt, "retrying lookup"
            );
            self.waiter.wait(
                self.policy.retry_delay,
                WaitReason::CallRetry,
                &format!("retrying lookup (attempt {attempt}/{max_attempts})"),
            )?;
        }
    }
}
