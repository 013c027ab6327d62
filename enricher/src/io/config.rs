//! Enricher configuration stored in `enricher.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::dataset::Columns;

/// Environment variable overriding [`LookupConfig::model`].
pub const ENV_MODEL: &str = "GEMINI_MODEL";
/// Environment variable overriding [`EnricherConfig::dataset_path`].
pub const ENV_DATASET: &str = "ENRICHER_DATASET";
/// Environment variable overriding [`EnricherConfig::sheet_name`].
pub const ENV_SHEET: &str = "ENRICHER_SHEET";

/// Enricher configuration (TOML).
///
/// Missing fields default to production-tuned values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnricherConfig {
    /// Spreadsheet (`.xlsx`) or `.csv` file holding the rows.
    pub dataset_path: PathBuf,

    /// Worksheet name; ignored for CSV.
    pub sheet_name: String,

    pub primary_name_column: String,
    pub secondary_name_column: String,
    pub result_column: String,

    /// Append-only audit log of not-found rows and run summaries.
    pub audit_log_path: PathBuf,

    /// Wait between reattempts while the lookup quota is exhausted.
    pub quota_wait_secs: u64,

    /// Give up after this many quota waits on a single task. Unset waits forever.
    pub max_quota_waits: Option<u32>,

    /// Pause after each persisted task.
    pub task_interval_secs: u64,

    pub lookup: LookupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LookupConfig {
    /// Program and leading arguments, e.g. `["gemini"]`.
    pub command: Vec<String>,

    /// Passed to the tool as `-m <model>`.
    pub model: String,

    /// Wall-clock budget for one invocation.
    pub call_timeout_secs: u64,

    /// Attempts per lookup for transient faults and timeouts.
    pub max_call_attempts: u32,

    pub call_retry_delay_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            command: vec!["gemini".to_string()],
            model: "gemini-2.5-flash".to_string(),
            call_timeout_secs: 60 * 60,
            max_call_attempts: 3,
            call_retry_delay_secs: 5,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("data.xlsx"),
            sheet_name: "Sheet1".to_string(),
            primary_name_column: "company_name".to_string(),
            secondary_name_column: "company_name_tc".to_string(),
            result_column: "Email".to_string(),
            audit_log_path: PathBuf::from("not_found_log.log"),
            quota_wait_secs: 30 * 60,
            max_quota_waits: None,
            task_interval_secs: 10,
            lookup: LookupConfig::default(),
        }
    }
}

impl LookupConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn call_retry_delay(&self) -> Duration {
        Duration::from_secs(self.call_retry_delay_secs)
    }
}

impl EnricherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dataset_path.as_os_str().is_empty() {
            return Err(anyhow!("dataset_path must be set"));
        }
        for (key, value) in [
            ("primary_name_column", &self.primary_name_column),
            ("secondary_name_column", &self.secondary_name_column),
            ("result_column", &self.result_column),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{key} must be non-empty"));
            }
        }
        if self.result_column == self.primary_name_column
            || self.result_column == self.secondary_name_column
        {
            return Err(anyhow!("result_column must differ from the name columns"));
        }
        if self.lookup.command.is_empty() || self.lookup.command[0].trim().is_empty() {
            return Err(anyhow!("lookup.command must be a non-empty array"));
        }
        if self.lookup.call_timeout_secs == 0 {
            return Err(anyhow!("lookup.call_timeout_secs must be > 0"));
        }
        if self.lookup.max_call_attempts == 0 {
            return Err(anyhow!("lookup.max_call_attempts must be >= 1"));
        }
        if self.lookup.output_limit_bytes == 0 {
            return Err(anyhow!("lookup.output_limit_bytes must be > 0"));
        }
        if self.max_quota_waits == Some(0) {
            return Err(anyhow!("max_quota_waits must be >= 1 when set"));
        }
        Ok(())
    }

    pub fn columns(&self) -> Columns {
        Columns {
            primary: self.primary_name_column.clone(),
            secondary: self.secondary_name_column.clone(),
            result: self.result_column.clone(),
        }
    }

    pub fn quota_wait(&self) -> Duration {
        Duration::from_secs(self.quota_wait_secs)
    }

    pub fn task_interval(&self) -> Duration {
        Duration::from_secs(self.task_interval_secs)
    }

    /// Apply overrides from a variable source (the process environment in production).
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = var(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            self.lookup.model = model;
        }
        if let Some(path) = var(ENV_DATASET).filter(|v| !v.trim().is_empty()) {
            self.dataset_path = PathBuf::from(path);
        }
        if let Some(sheet) = var(ENV_SHEET).filter(|v| !v.trim().is_empty()) {
            self.sheet_name = sheet;
        }
    }

    /// Human-readable listing logged at the start of a run.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        vec![
            ("dataset", self.dataset_path.display().to_string()),
            ("sheet", self.sheet_name.clone()),
            ("primary name column", self.primary_name_column.clone()),
            ("secondary name column", self.secondary_name_column.clone()),
            ("result column", self.result_column.clone()),
            ("audit log", self.audit_log_path.display().to_string()),
            ("lookup command", self.lookup.command.join(" ")),
            ("model", self.lookup.model.clone()),
            ("quota wait (min)", (self.quota_wait_secs / 60).to_string()),
            (
                "max quota waits",
                self.max_quota_waits
                    .map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
            ),
            ("task interval (s)", self.task_interval_secs.to_string()),
            ("call timeout (s)", self.lookup.call_timeout_secs.to_string()),
            ("call attempts", self.lookup.max_call_attempts.to_string()),
        ]
    }
}

/// Load config from a TOML file, then apply environment overrides.
///
/// If the file is missing, starts from `EnricherConfig::default()`.
pub fn load_config(path: &Path) -> Result<EnricherConfig> {
    let mut cfg = read_config(path)?;
    cfg.apply_env(|key| std::env::var(key).ok());
    cfg.validate()?;
    Ok(cfg)
}

fn read_config(path: &Path) -> Result<EnricherConfig> {
    if !path.exists() {
        return Ok(EnricherConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EnricherConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = read_config(&temp.path().join("missing.toml")).expect("read");
        assert_eq!(cfg, EnricherConfig::default());
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn write_then_read_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("enricher.toml");
        let cfg = EnricherConfig {
            max_quota_waits: Some(4),
            task_interval_secs: 0,
            ..EnricherConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = read_config(&path).expect("read");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("enricher.toml");
        fs::write(
            &path,
            "dataset_path = \"companies.csv\"\n[lookup]\nmax_call_attempts = 5\n",
        )
        .expect("write");
        let cfg = read_config(&path).expect("read");
        assert_eq!(cfg.dataset_path, PathBuf::from("companies.csv"));
        assert_eq!(cfg.lookup.max_call_attempts, 5);
        assert_eq!(cfg.lookup.model, "gemini-2.5-flash");
        assert_eq!(cfg.result_column, "Email");
    }

    #[test]
    fn env_overrides_model_and_dataset() {
        let mut cfg = EnricherConfig::default();
        cfg.apply_env(|key| match key {
            ENV_MODEL => Some("gemini-2.5-pro".to_string()),
            ENV_DATASET => Some("other.xlsx".to_string()),
            ENV_SHEET => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(cfg.lookup.model, "gemini-2.5-pro");
        assert_eq!(cfg.dataset_path, PathBuf::from("other.xlsx"));
        assert_eq!(cfg.sheet_name, "Sheet1");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let cfg = EnricherConfig {
            result_column: "company_name".to_string(),
            ..EnricherConfig::default()
        };
        assert!(cfg.validate().is_err());

        let mut cfg = EnricherConfig::default();
        cfg.lookup.max_call_attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EnricherConfig::default();
        cfg.lookup.command.clear();
        assert!(cfg.validate().is_err());
    }
}
