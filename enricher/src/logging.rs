//! Console tracing for run narration.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Progress and diagnostics via `RUST_LOG`, output
//!   to stderr. Not persisted.
//!
//! - **Audit log (`io/audit_log`)**: Product artifact appended on every run.
//!   Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `enricher=info` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=enricher=debug enricher run --yes
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("enricher=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
