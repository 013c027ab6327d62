//! Deterministic classification of lookup tool output.

use crate::core::result_state::NOT_FOUND;

/// Markers meaning the usage allowance is depleted.
const QUOTA_MARKERS: &[&str] = &["Quota exceeded", "RESOURCE_EXHAUSTED"];

/// Markers of faults worth retrying locally.
const TRANSIENT_MARKERS: &[&str] = &[
    "Gemini Error",
    "Error 502",
    "Client network socket disconnected",
    "socket hang up",
    "ECONNRESET",
    "ETIMEDOUT",
    "Premature close",
    "API Error",
];

/// How a failed tool invocation should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Stop retrying locally; the caller must wait for the quota to refill.
    Quota,
    /// Retry within the per-call attempt cap.
    Transient,
    /// Deterministic failure; do not retry.
    Permanent,
}

/// Classify the diagnostic text of a failed invocation.
///
/// Quota markers win over transient markers when both appear.
pub fn classify_failure(diagnostic: &str) -> FailureClass {
    if QUOTA_MARKERS.iter().any(|m| diagnostic.contains(m)) {
        FailureClass::Quota
    } else if TRANSIENT_MARKERS.iter().any(|m| diagnostic.contains(m)) {
        FailureClass::Transient
    } else {
        FailureClass::Permanent
    }
}

/// Answer extracted from successful tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Value(String),
    NotFound,
    Empty,
}

/// Take the last non-blank line of `stdout` as the answer.
///
/// The tool may print explanatory lines before the final answer.
pub fn extract_answer(stdout: &str) -> Answer {
    let Some(line) = stdout.lines().map(str::trim).rev().find(|l| !l.is_empty()) else {
        return Answer::Empty;
    };
    let bare = line.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.' | '*'));
    if bare.eq_ignore_ascii_case(NOT_FOUND) {
        Answer::NotFound
    } else {
        Answer::Value(line.to_string())
    }
}
