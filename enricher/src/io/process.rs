//! Child process execution for the lookup tool.
//!
//! The prompt goes in on stdin; the answer comes back as the last line of
//! stdout and failures are described on stderr. Both streams are drained on
//! their own threads while the child runs, and each is capped in memory: stdout
//! keeps its most recent bytes so the final answer line survives a chatty tool,
//! stderr keeps its first bytes where the error summary is printed.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// The program could not be located on `PATH`.
#[derive(Debug, thiserror::Error)]
#[error("program {program:?} not found on PATH")]
pub struct ProgramNotFound {
    pub program: String,
}

/// Which end of an oversized stream is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retain {
    Head,
    Tail,
}

/// Bytes kept from one stream plus how many were dropped.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    pub discarded: usize,
}

impl Captured {
    pub fn lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn is_truncated(&self) -> bool {
        self.discarded > 0
    }
}

/// Exit status and captured output of one tool run.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// Tail of stdout.
    pub stdout: Captured,
    /// Head of stderr.
    pub stderr: Captured,
    pub timed_out: bool,
}

/// Run `cmd`, feed it `stdin`, and kill it after `timeout`.
///
/// A missing program surfaces as [`ProgramNotFound`] inside the returned error.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), limit_bytes))]
pub fn run_tool_process(
    mut cmd: Command,
    stdin: &[u8],
    timeout: Duration,
    limit_bytes: usize,
) -> Result<ToolOutput> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let program = cmd.get_program().to_string_lossy().into_owned();
            error!(%program, "program not found");
            return Err(ProgramNotFound { program }.into());
        }
        Err(e) => return Err(e).context("spawn lookup tool"),
    };
    debug!(pid = child.id(), "lookup tool started");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_reader = thread::spawn(move || capture(stdout, limit_bytes, Retain::Tail));
    let stderr_reader = thread::spawn(move || capture(stderr, limit_bytes, Retain::Head));

    // Readers are running before the prompt is written so a child that echoes
    // while reading cannot fill its pipes and stall.
    let mut child_stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    match child_stdin.write_all(stdin) {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => debug!("lookup tool closed stdin early"),
        other => other.context("write prompt to stdin")?,
    }
    drop(child_stdin);

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for lookup tool")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "lookup tool timed out, killing");
            child.kill().context("kill lookup tool")?;
            (child.wait().context("reap lookup tool")?, true)
        }
    };

    let stdout = join_reader(stdout_reader).context("read stdout")?;
    let stderr = join_reader(stderr_reader).context("read stderr")?;
    if stdout.is_truncated() || stderr.is_truncated() {
        warn!(
            stdout_discarded = stdout.discarded,
            stderr_discarded = stderr.discarded,
            "lookup tool output exceeded the limit"
        );
    }

    Ok(ToolOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn join_reader(handle: thread::JoinHandle<Result<Captured>>) -> Result<Captured> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

/// Drain `reader` to the end, keeping at most `limit` bytes from the chosen end.
fn capture<R: Read>(mut reader: R, limit: usize, retain: Retain) -> Result<Captured> {
    let mut kept = VecDeque::<u8>::with_capacity(limit.min(1 << 16));
    let mut discarded = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        match retain {
            Retain::Head => {
                let take = n.min(limit.saturating_sub(kept.len()));
                kept.extend(&chunk[..take]);
                discarded += n - take;
            }
            Retain::Tail => {
                kept.extend(&chunk[..n]);
                if kept.len() > limit {
                    let excess = kept.len() - limit;
                    kept.drain(..excess);
                    discarded += excess;
                }
            }
        }
    }

    Ok(Captured {
        bytes: Vec::from(kept),
        discarded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_keeps_the_start() {
        let captured = capture(&b"0123456789"[..], 4, Retain::Head).expect("capture");
        assert_eq!(captured.bytes, b"0123");
        assert_eq!(captured.discarded, 6);
    }

    #[test]
    fn tail_keeps_the_end_across_chunks() {
        let mut data = vec![b'x'; 20_000];
        data.extend_from_slice(b"\ninfo@acme.hk\n");
        let captured = capture(&data[..], 15, Retain::Tail).expect("capture");
        assert_eq!(captured.lossy(), "x\ninfo@acme.hk\n");
        assert_eq!(captured.discarded, data.len() - 15);
    }

    #[test]
    fn under_limit_is_untouched() {
        let captured = capture(&b"short\n"[..], 100, Retain::Tail).expect("capture");
        assert_eq!(captured.lossy(), "short\n");
        assert!(!captured.is_truncated());
    }

    #[test]
    fn missing_program_is_typed() {
        let cmd = Command::new("enricher-test-definitely-missing-binary");
        let err = run_tool_process(cmd, b"", Duration::from_secs(1), 100).unwrap_err();
        let missing = err
            .downcast_ref::<ProgramNotFound>()
            .expect("ProgramNotFound");
        assert_eq!(missing.program, "enricher-test-definitely-missing-binary");
    }

    #[cfg(unix)]
    #[test]
    fn feeds_stdin_and_captures_both_streams() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("cat; echo done >&2");
        let output =
            run_tool_process(cmd, b"hello\n", Duration::from_secs(10), 1000).expect("run");
        assert!(output.status.success());
        assert_eq!(output.stdout.lossy(), "hello\n");
        assert_eq!(output.stderr.lossy(), "done\n");
        assert!(!output.timed_out);
    }

    #[cfg(unix)]
    #[test]
    fn child_ignoring_stdin_is_not_an_error() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo ok");
        let prompt = vec![b'p'; 1 << 20];
        let output = run_tool_process(cmd, &prompt, Duration::from_secs(10), 1000).expect("run");
        assert_eq!(output.stdout.lossy(), "ok\n");
    }

    #[cfg(unix)]
    #[test]
    fn kills_after_timeout() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("exec sleep 5");
        let output =
            run_tool_process(cmd, b"", Duration::from_millis(100), 1000).expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }
}
