//! Resumable batch email enrichment engine.
//!
//! Each row of a tabular dataset names a company; the engine asks an external
//! LLM CLI for the company's contact email and records the answer in the row.
//! Progress is persisted after every row, so a run interrupted by Ctrl-C, a
//! crash or an exhausted quota resumes where it stopped. The architecture keeps
//! a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (result states, failure
//!   classification, task selection, counters). No I/O.
//! - **[`io`]**: Side-effecting operations (tables on disk, subprocesses,
//!   timed waits, audit log). Each sits behind a trait so tests can substitute
//!   scripted fakes.
//!
//! Orchestration modules ([`lookup`], [`run_loop`], [`session`], [`status`])
//! combine the two to implement the CLI commands.

pub mod core;
pub mod dataset;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod lookup;
pub mod run_loop;
pub mod session;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
