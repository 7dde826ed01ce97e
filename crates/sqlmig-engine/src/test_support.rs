//! In-memory [`SqlExecutor`] double that understands the ledger statements.

use async_trait::async_trait;
use chrono::Utc;
use sqlmig_common::{Error, MigrationStatus, Result};
use sqlmig_db::{NamedParam, Row, SqlExecutor, SqlValue};
use std::sync::Mutex;
use std::time::Duration;

use crate::ledger::HistoryRecord;

#[derive(Default)]
pub struct RecordingExecutor {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    ledger: Vec<HistoryRecord>,
    executed: Vec<String>,
    fail_marker: Option<String>,
    offline: bool,
    no_ledger_table: bool,
    register: Option<(String, String)>,
    register_status: Option<MigrationStatus>,
    writes: usize,
}

impl RecordingExecutor {
    /// Any batch containing `marker` fails.
    pub fn failing_on(marker: &str) -> Self {
        let exec = Self::default();
        exec.state.lock().unwrap().fail_marker = Some(marker.to_string());
        exec
    }

    pub fn offline() -> Self {
        let exec = Self::default();
        exec.state.lock().unwrap().offline = true;
        exec
    }

    /// Behaves as a fresh database until the first ledger insert.
    pub fn without_ledger_table() -> Self {
        let exec = Self::default();
        exec.state.lock().unwrap().no_ledger_table = true;
        exec
    }

    /// A batch containing `marker` inserts its own ledger row for `migration_id`,
    /// the way a bootstrap script does.
    pub fn registering_on(marker: &str, migration_id: &str) -> Self {
        let exec = Self::default();
        exec.state.lock().unwrap().register = Some((marker.to_string(), migration_id.to_string()));
        exec
    }

    /// Self-registration writes a Failed row instead of Success.
    pub fn fail_registration(&self) {
        self.state.lock().unwrap().register_status = Some(MigrationStatus::Failed);
    }

    pub fn seed(&self, migration_id: &str, checksum: &str, status: MigrationStatus) {
        let mut state = self.state.lock().unwrap();
        let id = state.ledger.len() as i64 + 1;
        state.ledger.push(HistoryRecord {
            id,
            migration_id: migration_id.to_string(),
            file_name: format!("{migration_id}.sql"),
            applied_date: Utc::now(),
            checksum: checksum.to_string(),
            status,
            execution_time_ms: Some(1),
            error_message: (status == MigrationStatus::Failed).then(|| "seeded".to_string()),
        });
    }

    pub fn ledger_rows(&self) -> Vec<HistoryRecord> {
        self.state.lock().unwrap().ledger.clone()
    }

    pub fn executed_batches(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes
    }
}

fn text(params: &[NamedParam], name: &str) -> Option<String> {
    params.iter().find(|p| p.name == name).and_then(|p| match &p.value {
        SqlValue::Text(v) => Some(v.clone()),
        _ => None,
    })
}

fn integer(params: &[NamedParam], name: &str) -> Option<i64> {
    params.iter().find(|p| p.name == name).and_then(|p| match &p.value {
        SqlValue::Integer(v) => Some(*v),
        _ => None,
    })
}

#[async_trait]
impl SqlExecutor for RecordingExecutor {
    async fn query_scalar(&self, sql: &str, _params: &[NamedParam]) -> Result<Option<SqlValue>> {
        Err(Error::Database(format!("unsupported scalar query: {sql}")))
    }

    async fn execute(&self, sql: &str, params: &[NamedParam]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.offline {
            return Err(Error::Connectivity("database offline".into()));
        }
        if !sql.trim_start().starts_with("INSERT INTO") {
            return Err(Error::Database(format!("unsupported statement: {sql}")));
        }

        let migration_id = text(params, "migration_id").unwrap_or_default();
        if state.ledger.iter().any(|r| r.migration_id == migration_id) {
            return Err(Error::IntegrityConflict(format!(
                "UNIQUE constraint failed: MigrationId {migration_id}"
            )));
        }

        let status = MigrationStatus::from_db(&text(params, "status").unwrap_or_default())?;
        let id = state.ledger.len() as i64 + 1;
        state.ledger.push(HistoryRecord {
            id,
            migration_id,
            file_name: text(params, "file_name").unwrap_or_default(),
            applied_date: Utc::now(),
            checksum: text(params, "checksum").unwrap_or_default(),
            status,
            execution_time_ms: integer(params, "execution_time"),
            error_message: text(params, "error_message"),
        });
        state.writes += 1;
        state.no_ledger_table = false;
        Ok(1)
    }

    async fn query_rows(&self, sql: &str, _params: &[NamedParam]) -> Result<Vec<Row>> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(Error::Connectivity("database offline".into()));
        }

        if sql.starts_with("SELECT MigrationId, Status") {
            let columns = vec!["MigrationId".to_string(), "Status".to_string()];
            return Ok(state
                .ledger
                .iter()
                .map(|r| {
                    Row::new(
                        columns.clone(),
                        vec![
                            SqlValue::Text(r.migration_id.clone()),
                            SqlValue::Text(r.status.as_str().to_string()),
                        ],
                    )
                })
                .collect());
        }

        if sql.starts_with("SELECT Id,") {
            let columns: Vec<String> = [
                "Id",
                "MigrationId",
                "Filename",
                "AppliedDate",
                "Checksum",
                "Status",
                "ExecutionTime",
                "ErrorMessage",
            ]
            .map(String::from)
            .to_vec();
            return Ok(state
                .ledger
                .iter()
                .map(|r| {
                    Row::new(
                        columns.clone(),
                        vec![
                            SqlValue::Integer(r.id),
                            SqlValue::Text(r.migration_id.clone()),
                            SqlValue::Text(r.file_name.clone()),
                            SqlValue::Text(r.applied_date.to_rfc3339()),
                            SqlValue::Text(r.checksum.clone()),
                            SqlValue::Text(r.status.as_str().to_string()),
                            r.execution_time_ms.into(),
                            r.error_message.clone().into(),
                        ],
                    )
                })
                .collect());
        }

        Err(Error::Database(format!("unsupported query: {sql}")))
    }

    async fn table_exists(&self, _table: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(Error::Connectivity("database offline".into()));
        }
        Ok(!state.no_ledger_table)
    }

    async fn execute_batches(&self, batches: &[String], _timeout: Duration) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.offline {
            return Err(Error::Connectivity("database offline".into()));
        }

        for batch in batches {
            state.executed.push(batch.clone());
            if let Some(marker) = &state.fail_marker {
                if batch.contains(marker.as_str()) {
                    return Err(Error::Database(format!(
                        "simulated failure in: {}",
                        batch.trim()
                    )));
                }
            }
            let registered = state
                .register
                .as_ref()
                .filter(|(marker, _)| batch.contains(marker.as_str()))
                .map(|(_, id)| id.clone());
            if let Some(migration_id) = registered {
                let status = state.register_status.unwrap_or(MigrationStatus::Success);
                let id = state.ledger.len() as i64 + 1;
                state.ledger.push(HistoryRecord {
                    id,
                    file_name: format!("{migration_id}.sql"),
                    migration_id,
                    applied_date: Utc::now(),
                    checksum: String::new(),
                    status,
                    execution_time_ms: None,
                    error_message: None,
                });
                state.no_ledger_table = false;
            }
        }
        Ok(())
    }
}
