use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Name of the history table unless configured otherwise.
pub const DEFAULT_LEDGER_TABLE: &str = "__MigrationHistory";

/// Outcome stored in the ledger for one migration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationStatus {
    Success,
    Failed,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failed => "Failed",
        }
    }

    pub fn from_db(value: &str) -> Result<Self> {
        match value {
            "Success" => Ok(Self::Success),
            "Failed" => Ok(Self::Failed),
            other => Err(Error::Database(format!("unknown migration status: {other}"))),
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMigration {
    pub migration_id: String,
    pub file_name: String,
}

/// Counts produced by one `migrate` run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub applied: usize,
    pub failed: usize,
    /// Discovered migrations already present in the ledger.
    pub skipped: usize,
    pub pending: Vec<PendingMigration>,
    pub dry_run: bool,
}
