//! Lookup tool abstraction.
//!
//! The [`LookupTool`] trait decouples the lookup client from the actual CLI
//! backend (currently `gemini`). Tests use scripted tools that return
//! predetermined attempts without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::io::config::LookupConfig;
use crate::io::process::run_tool_process;

/// Transport-level result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// Exited successfully; raw stdout.
    Completed { stdout: String },
    /// Exited with a failure code; stderr diagnostic.
    Failed {
        exit_code: Option<i32>,
        diagnostic: String,
    },
    /// Killed after exceeding the call timeout.
    TimedOut,
}

/// One attempt against the external lookup tool.
pub trait LookupTool {
    /// Run the tool once with `prompt` on stdin.
    ///
    /// A missing executable is an error carrying
    /// [`crate::io::process::ProgramNotFound`].
    fn invoke(&self, prompt: &str, timeout: Duration) -> Result<Attempt>;
}

/// Tool that spawns the configured CLI as `<command...> -m <model>`.
pub struct CliLookupTool {
    command: Vec<String>,
    model: String,
    output_limit_bytes: usize,
}

impl CliLookupTool {
    pub fn from_config(cfg: &LookupConfig) -> Self {
        Self {
            command: cfg.command.clone(),
            model: cfg.model.clone(),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    fn build_command(&self) -> Command {
        let mut parts = self.command.iter();
        let program = parts.next().map(String::as_str).unwrap_or("gemini");
        let mut cmd = Command::new(program);
        cmd.args(parts).arg("-m").arg(&self.model);
        cmd
    }
}

impl LookupTool for CliLookupTool {
    #[instrument(skip_all, fields(model = %self.model, timeout_secs = timeout.as_secs()))]
    fn invoke(&self, prompt: &str, timeout: Duration) -> Result<Attempt> {
        let output = run_tool_process(
            self.build_command(),
            prompt.as_bytes(),
            timeout,
            self.output_limit_bytes,
        )
        .context("run lookup tool")?;

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "lookup tool timed out");
            return Ok(Attempt::TimedOut);
        }
        if !output.status.success() {
            let diagnostic = output.stderr.lossy().trim().to_string();
            debug!(exit_code = ?output.status.code(), "lookup tool failed");
            return Ok(Attempt::Failed {
                exit_code: output.status.code(),
                diagnostic,
            });
        }

        let mut stdout = output.stdout.lossy();
        if output.stdout.is_truncated() {
            stdout = complete_lines(&stdout).to_string();
        }
        debug!(stdout_bytes = stdout.len(), "lookup tool completed");
        Ok(Attempt::Completed { stdout })
    }
}

/// Drop the leading line fragment of a stream that was cut at the front.
fn complete_lines(tail: &str) -> &str {
    tail.split_once('\n').map_or("", |(_, rest)| rest)
}
