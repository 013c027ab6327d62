//! Stable exit codes for enricher CLI commands.

/// Command succeeded, or a run completed or was cancelled after saving.
pub const OK: i32 = 0;
/// Dataset or lookup tool missing, invalid config, or any other error.
pub const FAILED: i32 = 1;
/// `enricher run` stopped because `max_quota_waits` was reached.
pub const QUOTA_EXHAUSTED: i32 = 2;
