//! Timed, cancellable waits.
//!
//! Every suspension point of a run (local retry delay, quota wait, inter-task
//! pause) goes through a [`Waiter`], so a Ctrl-C is honoured within one poll
//! slice and tests can observe waits without sleeping.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::io::cancel::{CancelToken, Cancelled};

const POLL_SLICE: Duration = Duration::from_millis(100);

/// Why a wait happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Delay between local attempts of one lookup.
    CallRetry,
    /// Waiting for the lookup quota to refill.
    Quota,
    /// Pause between tasks.
    TaskInterval,
}

pub trait Waiter {
    /// Block for `duration` unless cancellation is requested first.
    fn wait(&self, duration: Duration, reason: WaitReason, message: &str) -> Result<(), Cancelled>;

    /// Poll for cancellation without waiting.
    fn check(&self) -> Result<(), Cancelled>;
}

/// Production waiter: sleeps in short slices, showing a spinner on a TTY.
pub struct SpinnerWaiter {
    token: CancelToken,
}

impl SpinnerWaiter {
    pub fn new(token: CancelToken) -> Self {
        Self { token }
    }
}

impl Waiter for SpinnerWaiter {
    fn wait(&self, duration: Duration, _reason: WaitReason, message: &str) -> Result<(), Cancelled> {
        self.token.check()?;
        if duration.is_zero() {
            return Ok(());
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));

        let deadline = Instant::now() + duration;
        let result = loop {
            if let Err(cancelled) = self.token.check() {
                break Err(cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                break Ok(());
            }
            let remaining = deadline - now;
            spinner.set_message(format!("{message} ({}s left)", remaining.as_secs() + 1));
            std::thread::sleep(remaining.min(POLL_SLICE));
        };

        spinner.finish_and_clear();
        result
    }

    fn check(&self) -> Result<(), Cancelled> {
        self.token.check()
    }
}
