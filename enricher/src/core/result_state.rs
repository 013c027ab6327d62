//! Tagged classification of a row's result cell.
//!
//! The persisted table stores results as plain text. Reserved sentinel strings
//! stand in for the non-success states; [`ResultState::parse`] and
//! [`ResultState::as_cell`] are the only places that convert between the two
//! representations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel stored when the lookup legitimately found nothing.
pub const NOT_FOUND: &str = "Not Found";

const ERROR_PREFIX: &str = "Error:";
const NO_OUTPUT: &str = "Error: No output";
const CALL_FAILED: &str = "Error: Gemini call failed";
const TIMEOUT: &str = "Error: Timeout";

/// Transient failure kinds. Rows in any of these states are revisited by the
/// default `continue` selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// The tool exited cleanly but printed nothing.
    NoOutput,
    /// The tool reported a failure (after local retries, if any applied).
    CallFailed,
    /// Every attempt hit the call timeout.
    Timeout,
}

impl ErrorKind {
    pub fn sentinel(self) -> &'static str {
        match self {
            Self::NoOutput => NO_OUTPUT,
            Self::CallFailed => CALL_FAILED,
            Self::Timeout => TIMEOUT,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NoOutput => "no-output",
            Self::CallFailed => "call-failed",
            Self::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// Classification of a result cell, re-derived on every read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultState {
    Empty,
    Success(String),
    NotFound,
    RetryableError(ErrorKind),
}

impl ResultState {
    /// Decode the persisted text of a result cell.
    ///
    /// Unknown `Error:` texts decode as [`ErrorKind::CallFailed`] so they are
    /// retried rather than mistaken for a found address.
    pub fn parse(cell: &str) -> Self {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if trimmed == NOT_FOUND {
            return Self::NotFound;
        }
        match trimmed {
            NO_OUTPUT => Self::RetryableError(ErrorKind::NoOutput),
            CALL_FAILED => Self::RetryableError(ErrorKind::CallFailed),
            TIMEOUT => Self::RetryableError(ErrorKind::Timeout),
            other if other.starts_with(ERROR_PREFIX) => {
                Self::RetryableError(ErrorKind::CallFailed)
            }
            other => Self::Success(other.to_string()),
        }
    }

    /// Encode for storage.
    pub fn as_cell(&self) -> &str {
        match self {
            Self::Empty => "",
            Self::Success(value) => value,
            Self::NotFound => NOT_FOUND,
            Self::RetryableError(kind) => kind.sentinel(),
        }
    }

    /// `Success` or `NotFound`: the row has a final answer.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::NotFound)
    }

    /// `Empty` or `RetryableError`: the row still needs work.
    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognizes_reserved_sentinels() {
        assert_eq!(ResultState::parse(""), ResultState::Empty);
        assert_eq!(ResultState::parse("   "), ResultState::Empty);
        assert_eq!(ResultState::parse("Not Found"), ResultState::NotFound);
        assert_eq!(
            ResultState::parse("Error: No output"),
            ResultState::RetryableError(ErrorKind::NoOutput)
        );
        assert_eq!(
            ResultState::parse("Error: Gemini call failed"),
            ResultState::RetryableError(ErrorKind::CallFailed)
        );
        assert_eq!(
            ResultState::parse("Error: Timeout"),
            ResultState::RetryableError(ErrorKind::Timeout)
        );
    }

    #[test]
    fn unknown_error_text_is_retryable_not_success() {
        assert_eq!(
            ResultState::parse("Error: Unknown error after retries"),
            ResultState::RetryableError(ErrorKind::CallFailed)
        );
    }

    #[test]
    fn other_text_is_success_and_trimmed() {
        assert_eq!(
            ResultState::parse("  info@example.com \n"),
            ResultState::Success("info@example.com".to_string())
        );
    }

    #[test]
    fn every_error_kind_encodes_to_a_sentinel_that_parses_back() {
        for kind in [ErrorKind::NoOutput, ErrorKind::CallFailed, ErrorKind::Timeout] {
            let state = ResultState::RetryableError(kind);
            assert_eq!(ResultState::parse(state.as_cell()), state);
        }
    }

    #[test]
    fn pending_and_terminal_partition_states() {
        assert!(ResultState::Empty.is_pending());
        assert!(ResultState::RetryableError(ErrorKind::Timeout).is_pending());
        assert!(ResultState::NotFound.is_terminal());
        assert!(ResultState::Success("a@b.c".to_string()).is_terminal());
    }
}
