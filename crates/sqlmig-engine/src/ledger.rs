use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use sqlmig_common::{Error, MigrationStatus, Result};
use sqlmig_db::{Row, SqlExecutor, param};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::file::MigrationFile;

pub use sqlmig_common::DEFAULT_LEDGER_TABLE;

/// A row of the history ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub migration_id: String,
    pub file_name: String,
    pub applied_date: DateTime<Utc>,
    pub checksum: String,
    pub status: MigrationStatus,
    pub execution_time_ms: Option<i64>,
    pub error_message: Option<String>,
}

impl HistoryRecord {
    pub fn from_row(row: &Row) -> Result<Self> {
        let applied_date = parse_timestamp(&row.get_string("AppliedDate")?)?;
        let status = MigrationStatus::from_db(&row.get_string("Status")?)?;

        Ok(Self {
            id: row.get_i64("Id")?,
            migration_id: row.get_string("MigrationId")?,
            file_name: row.get_string("Filename")?,
            applied_date,
            checksum: row.get_opt_string("Checksum")?.unwrap_or_default(),
            status,
            execution_time_ms: row.get_opt_i64("ExecutionTime")?,
            error_message: row.get_opt_string("ErrorMessage")?,
        })
    }
}

/// Insert shape for a ledger row; `Id` and `AppliedDate` are assigned on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryRecord {
    pub migration_id: String,
    pub file_name: String,
    pub checksum: String,
    pub status: MigrationStatus,
    pub execution_time_ms: Option<i64>,
    pub error_message: Option<String>,
}

impl NewHistoryRecord {
    pub fn success(file: &MigrationFile, execution_time_ms: i64) -> Self {
        Self {
            migration_id: file.migration_id.clone(),
            file_name: file.file_name.clone(),
            checksum: file.checksum.clone(),
            status: MigrationStatus::Success,
            execution_time_ms: Some(execution_time_ms),
            error_message: None,
        }
    }

    pub fn failed(file: &MigrationFile, execution_time_ms: i64, error_message: &str) -> Self {
        Self {
            status: MigrationStatus::Failed,
            error_message: Some(error_message.to_string()),
            ..Self::success(file, execution_time_ms)
        }
    }
}

/// Access to the persisted migration history table.
///
/// The table itself is created by the first migration script, not here.
#[derive(Clone)]
pub struct HistoryLedger {
    executor: Arc<dyn SqlExecutor>,
    table: String,
}

impl HistoryLedger {
    /// `table` must already be validated as a plain identifier.
    pub fn new(executor: Arc<dyn SqlExecutor>, table: impl Into<String>) -> Self {
        Self {
            executor,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn exists(&self) -> Result<bool> {
        let exists = self.executor.table_exists(&self.table).await?;
        if !exists {
            debug!("ledger table {} not found, treating history as empty", self.table);
        }
        Ok(exists)
    }

    /// Every migration id present in the ledger, whatever its status.
    pub async fn list_applied_ids(&self) -> Result<HashSet<String>> {
        Ok(self.applied_statuses().await?.into_keys().collect())
    }

    /// Status per recorded migration id. A ledger table that does not exist yet
    /// reads as empty so the bootstrap migration can run.
    pub async fn applied_statuses(&self) -> Result<HashMap<String, MigrationStatus>> {
        if !self.exists().await? {
            return Ok(HashMap::new());
        }
        let rows = self
            .executor
            .query_rows(
                &format!("SELECT MigrationId, Status FROM {}", self.table),
                &[],
            )
            .await?;

        rows.iter()
            .map(|row| -> Result<(String, MigrationStatus)> {
                let status = MigrationStatus::from_db(&row.get_string("Status")?)?;
                Ok((row.get_string("MigrationId")?, status))
            })
            .collect()
    }

    pub async fn record(&self, record: &NewHistoryRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (MigrationId, Filename, AppliedDate, Checksum, Status, ExecutionTime, ErrorMessage)
             VALUES (:migration_id, :file_name, :applied_date, :checksum, :status, :execution_time, :error_message)",
            self.table
        );
        let params = [
            param("migration_id", record.migration_id.as_str()),
            param("file_name", record.file_name.as_str()),
            param("applied_date", Utc::now().to_rfc3339()),
            param("checksum", record.checksum.as_str()),
            param("status", record.status.as_str()),
            param("execution_time", record.execution_time_ms),
            param("error_message", record.error_message.clone()),
        ];

        self.executor.execute(&sql, &params).await?;
        Ok(())
    }

    pub async fn list_history(&self) -> Result<Vec<HistoryRecord>> {
        if !self.exists().await? {
            return Ok(Vec::new());
        }
        let rows = self
            .executor
            .query_rows(
                &format!(
                    "SELECT Id, MigrationId, Filename, AppliedDate, Checksum, Status, ExecutionTime, ErrorMessage
                     FROM {} ORDER BY Id",
                    self.table
                ),
                &[],
            )
            .await?;

        rows.iter().map(HistoryRecord::from_row).collect()
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    // SQLite `datetime('now')`, optionally with fractional seconds.
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
        }
    }

    Err(Error::Database(format!("invalid timestamp format: {raw}")))
}
