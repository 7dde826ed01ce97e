use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use sqlmig_common::DEFAULT_LEDGER_TABLE;
pub const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection string used when `--connection` is not given.
    #[serde(default)]
    pub connection: Option<String>,

    #[serde(default)]
    pub migrations_dir: Option<PathBuf>,

    #[serde(default = "default_ledger_table")]
    pub ledger_table: String,

    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,

    #[serde(default)]
    pub log_level: Option<String>,
}

impl AppConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            connection: None,
            migrations_dir: None,
            ledger_table: default_ledger_table(),
            batch_timeout_secs: default_batch_timeout_secs(),
            log_level: Some("info".to_string()),
        }
    }
}

fn default_ledger_table() -> String {
    DEFAULT_LEDGER_TABLE.to_string()
}

fn default_batch_timeout_secs() -> u64 {
    DEFAULT_BATCH_TIMEOUT_SECS
}
