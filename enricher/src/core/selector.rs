//! Deterministic task selection over the current dataset state.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::core::result_state::ResultState;
use crate::dataset::Dataset;

/// How to pick the rows for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Reset retryable errors to empty, then process every empty row.
    Continue,
    /// Clear every result and process all rows.
    Restart,
    /// Process only rows holding `Not Found`.
    RetryNotFound,
    /// No progress exists yet; same selection as `Continue`.
    Fresh,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Restart => "restart",
            Self::RetryNotFound => "retry-not-found",
            Self::Fresh => "fresh",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "continue" => Ok(Self::Continue),
            "restart" => Ok(Self::Restart),
            "retry-not-found" => Ok(Self::RetryNotFound),
            other => Err(anyhow!(
                "unknown mode {other:?} (expected continue, restart or retry-not-found)"
            )),
        }
    }
}

/// Snapshot of how many rows are in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounts {
    pub success: usize,
    pub not_found: usize,
    /// Empty or retryable-error rows.
    pub pending: usize,
    pub total: usize,
}

impl ProgressCounts {
    pub fn tally(dataset: &Dataset) -> Self {
        let mut counts = Self {
            total: dataset.len(),
            ..Self::default()
        };
        for state in dataset.results() {
            match state {
                state if state.is_pending() => counts.pending += 1,
                ResultState::NotFound => counts.not_found += 1,
                _ => counts.success += 1,
            }
        }
        counts
    }

    pub fn has_progress(&self) -> bool {
        self.success > 0 || self.not_found > 0
    }
}

/// At least one row holds `Success` or `NotFound`.
pub fn has_progress(dataset: &Dataset) -> bool {
    dataset.results().any(|state| state.is_terminal())
}

/// Pick the effective mode: `Fresh` whenever there is no progress to protect,
/// otherwise the requested mode (default `Continue`).
pub fn resolve_mode(dataset: &Dataset, requested: Option<Mode>) -> Mode {
    if !has_progress(dataset) {
        return Mode::Fresh;
    }
    match requested {
        None | Some(Mode::Fresh) => Mode::Continue,
        Some(mode) => mode,
    }
}

/// The requested mode when [`resolve_mode`] replaced it with a different one.
pub fn overridden_request(requested: Option<Mode>, effective: Mode) -> Option<Mode> {
    requested.filter(|mode| *mode != effective)
}

/// Compute the ordered row indices to process, applying the mode's resets.
pub fn select(dataset: &mut Dataset, mode: Mode) -> Result<Vec<usize>> {
    match mode {
        Mode::Continue | Mode::Fresh => {
            let mut selected = Vec::new();
            for index in 0..dataset.len() {
                match dataset.result(index) {
                    Some(ResultState::RetryableError(_)) => {
                        dataset.set_result(index, &ResultState::Empty)?;
                        selected.push(index);
                    }
                    Some(ResultState::Empty) => selected.push(index),
                    _ => {}
                }
            }
            Ok(selected)
        }
        Mode::Restart => {
            for index in 0..dataset.len() {
                dataset.set_result(index, &ResultState::Empty)?;
            }
            Ok((0..dataset.len()).collect())
        }
        Mode::RetryNotFound => Ok(dataset
            .results()
            .enumerate()
            .filter(|(_, state)| *state == ResultState::NotFound)
            .map(|(index, _)| index)
            .collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::dataset_with_results;

    fn mixed() -> Dataset {
        dataset_with_results(&[
            "a@x.com",
            "",
            "Not Found",
            "Error: Gemini call failed",
            "Error: Timeout",
            "Error: No output",
        ])
    }

    #[test]
    fn continue_reselects_empty_and_errors_but_not_terminal_rows() {
        let mut dataset = mixed();
        let selected = select(&mut dataset, Mode::Continue).expect("select");
        assert_eq!(selected, vec![1, 3, 4, 5]);
        assert_eq!(dataset.result(3), Some(ResultState::Empty));
        assert_eq!(
            dataset.result(0),
            Some(ResultState::Success("a@x.com".to_string()))
        );
        assert_eq!(dataset.result(2), Some(ResultState::NotFound));
    }

    #[test]
    fn restart_clears_everything_and_selects_all() {
        let mut dataset = mixed();
        let selected = select(&mut dataset, Mode::Restart).expect("select");
        assert_eq!(selected, (0..6).collect::<Vec<_>>());
        assert!(dataset.results().all(|state| state == ResultState::Empty));
    }

    #[test]
    fn retry_not_found_selects_exactly_not_found_rows() {
        let mut dataset = dataset_with_results(&["Not Found", "b@x.com", "", "Not Found"]);
        let before = dataset.clone();
        let selected = select(&mut dataset, Mode::RetryNotFound).expect("select");
        assert_eq!(selected, vec![0, 3]);
        assert_eq!(dataset, before);
    }

    #[test]
    fn resolve_mode_is_fresh_without_progress() {
        let dataset = dataset_with_results(&["", "Error: Timeout"]);
        assert!(!has_progress(&dataset));
        assert_eq!(resolve_mode(&dataset, Some(Mode::Restart)), Mode::Fresh);
    }

    #[test]
    fn resolve_mode_defaults_to_continue_with_progress() {
        let dataset = dataset_with_results(&["Not Found", ""]);
        assert_eq!(resolve_mode(&dataset, None), Mode::Continue);
        assert_eq!(
            resolve_mode(&dataset, Some(Mode::RetryNotFound)),
            Mode::RetryNotFound
        );
    }

    #[test]
    fn override_is_reported_only_when_the_mode_changed() {
        let fresh = dataset_with_results(&["", ""]);
        let effective = resolve_mode(&fresh, Some(Mode::RetryNotFound));
        assert_eq!(
            overridden_request(Some(Mode::RetryNotFound), effective),
            Some(Mode::RetryNotFound)
        );
        assert_eq!(overridden_request(None, effective), None);

        let progressed = dataset_with_results(&["a@x.com", ""]);
        let effective = resolve_mode(&progressed, Some(Mode::Restart));
        assert_eq!(overridden_request(Some(Mode::Restart), effective), None);
    }

    #[test]
    fn progress_counts_partition_rows() {
        let counts = ProgressCounts::tally(&mixed());
        assert_eq!(
            counts,
            ProgressCounts {
                success: 1,
                not_found: 1,
                pending: 4,
                total: 6,
            }
        );
        assert!(counts.has_progress());
    }

    #[test]
    fn mode_parses_cli_names() {
        assert_eq!("retry-not-found".parse::<Mode>().expect("parse"), Mode::RetryNotFound);
        assert!("fresh".parse::<Mode>().is_err());
    }
}
