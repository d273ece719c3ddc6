use crate::source::{DEFAULT_QUOTE_BASE_URL, DEFAULT_STATEMENT_BASE_URL};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Earliest year the regulator publishes standardized filings for.
pub const MIN_YEAR: i32 = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub db_path: String,
    /// Scratch directory for downloaded and extracted archives.
    pub data_dir: String,
    /// First year of a full historical import.
    pub first_year: i32,
    /// Deadline for importing one year.
    pub timeout_secs: u64,
    /// Import quarterly (ITR) instead of annual (DFP) filings.
    pub quarterly: bool,
    pub statement_base_url: String,
    pub quote_base_url: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            db_path: "filings.db".into(),
            data_dir: std::env::temp_dir().join("filings").display().to_string(),
            first_year: 2010,
            timeout_secs: 20 * 60,
            quarterly: false,
            statement_base_url: DEFAULT_STATEMENT_BASE_URL.into(),
            quote_base_url: DEFAULT_QUOTE_BASE_URL.into(),
        }
    }
}

impl IngestConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    /// In tests, use IngestConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let cfg: IngestConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        if cfg.first_year < MIN_YEAR {
            anyhow::bail!("{path}: first_year must be >= {MIN_YEAR}, got {}", cfg.first_year);
        }
        Ok(cfg)
    }

    /// Config with an in-memory database, for unit tests.
    pub fn default_test() -> Self {
        Self {
            db_path: ":memory:".into(),
            timeout_secs: 60,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Years to import, newest first. A valid `restrict` selects one year.
    pub fn years(&self, restrict: Option<i32>) -> Vec<i32> {
        self.years_until(restrict, chrono::Local::now().year())
    }

    fn years_until(&self, restrict: Option<i32>, current: i32) -> Vec<i32> {
        match restrict {
            Some(year) if year >= MIN_YEAR => vec![year],
            _ => (self.first_year..=current).rev().collect(),
        }
    }
}
