use async_trait::async_trait;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension, ffi};
use sqlmig_common::{Error, Result};
use std::time::Duration;
use tracing::{debug, warn};

use crate::executor::{NamedParam, Row, SqlExecutor, SqlValue};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// [`SqlExecutor`] backed by a SQLite database file.
///
/// No connection is held between calls: each operation opens the database,
/// does its work on the blocking pool and drops the connection.
///
/// Statements (`execute`, `execute_batches`) may create a missing database file.
/// Queries only do so when built with [`SqliteExecutor::create_if_missing`];
/// otherwise a missing file is a `Connectivity` error and nothing is written.
#[derive(Debug, Clone)]
pub struct SqliteExecutor {
    target: String,
    create_if_missing: bool,
}

impl SqliteExecutor {
    /// Accepts a file path, optionally prefixed with `sqlite://` or `sqlite:`,
    /// or a `file:` URI.
    pub fn new(connection: &str) -> Result<Self> {
        let trimmed = connection.trim();
        let target = trimmed
            .strip_prefix("sqlite://")
            .or_else(|| trimmed.strip_prefix("sqlite:"))
            .unwrap_or(trimmed);

        if target.is_empty() {
            return Err(Error::Config("connection string is empty".into()));
        }
        if target == ":memory:" {
            return Err(Error::Config(
                "in-memory databases do not persist between calls; use a file path".into(),
            ));
        }

        Ok(Self {
            target: target.to_string(),
            create_if_missing: false,
        })
    }

    #[must_use]
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    async fn with_connection<T, F>(&self, create: bool, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let target = self.target.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_connection(&target, create)?;
            f(&conn)
        })
        .await
        .map_err(|e| Error::Database(format!("database task failed: {e}")))?
    }
}

fn open_connection(target: &str, create: bool) -> Result<Connection> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if create {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }
    let conn = Connection::open_with_flags(target, flags)
        .map_err(|e| Error::Connectivity(format!("failed to open {target}: {e}")))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| Error::Connectivity(format!("failed to configure {target}: {e}")))?;
    Ok(conn)
}

#[async_trait]
impl SqlExecutor for SqliteExecutor {
    async fn query_scalar(&self, sql: &str, params: &[NamedParam]) -> Result<Option<SqlValue>> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_connection(self.create_if_missing, move |conn| {
            let names = placeholder_names(&params);
            let bound = bind(&names, &params);
            conn.query_row(&sql, bound.as_slice(), |row| {
                row.get_ref(0).map(value_from_ref)
            })
            .optional()
            .map_err(map_query_error)
        })
        .await
    }

    async fn execute(&self, sql: &str, params: &[NamedParam]) -> Result<usize> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_connection(true, move |conn| {
            let names = placeholder_names(&params);
            let bound = bind(&names, &params);
            conn.execute(&sql, bound.as_slice())
                .map_err(map_query_error)
        })
        .await
    }

    async fn query_rows(&self, sql: &str, params: &[NamedParam]) -> Result<Vec<Row>> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_connection(self.create_if_missing, move |conn| {
            let names = placeholder_names(&params);
            let bound = bind(&names, &params);

            let mut stmt = conn.prepare(&sql).map_err(map_query_error)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();
            let count = columns.len();

            let rows = stmt
                .query_map(bound.as_slice(), |row| {
                    (0..count)
                        .map(|i| row.get_ref(i).map(value_from_ref))
                        .collect::<rusqlite::Result<Vec<_>>>()
                })
                .map_err(map_query_error)?;

            let mut out = Vec::new();
            for values in rows {
                out.push(Row::new(columns.clone(), values.map_err(map_query_error)?));
            }
            Ok(out)
        })
        .await
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let count = self
            .query_scalar(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = :name",
                &[crate::executor::param("name", table)],
            )
            .await?;
        Ok(matches!(count, Some(SqlValue::Integer(n)) if n > 0))
    }

    async fn execute_batches(&self, batches: &[String], timeout: Duration) -> Result<()> {
        let target = self.target.clone();
        let mut conn = tokio::task::spawn_blocking(move || open_connection(&target, true))
            .await
            .map_err(|e| Error::Database(format!("database task failed: {e}")))??;

        for (index, batch) in batches.iter().enumerate() {
            debug!("executing batch {} of {}", index + 1, batches.len());
            let interrupt = conn.get_interrupt_handle();
            let sql = batch.clone();
            let task = tokio::task::spawn_blocking(move || {
                let outcome = conn.execute_batch(&sql);
                (conn, outcome)
            });

            match tokio::time::timeout(timeout, task).await {
                Ok(Ok((returned, Ok(())))) => conn = returned,
                Ok(Ok((_, Err(e)))) => return Err(map_query_error(e)),
                Ok(Err(e)) => return Err(Error::Database(format!("database task failed: {e}"))),
                Err(_) => {
                    // The blocking task still owns the connection; interrupting the
                    // statement lets it return and drop the connection.
                    interrupt.interrupt();
                    warn!("batch {} exceeded {timeout:?}, interrupted", index + 1);
                    return Err(Error::Database(format!(
                        "batch {} timed out after {timeout:?}",
                        index + 1
                    )));
                }
            }
        }

        Ok(())
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            SqlValue::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
    }
}

fn placeholder_names(params: &[NamedParam]) -> Vec<String> {
    params.iter().map(|p| format!(":{}", p.name)).collect()
}

fn bind<'a>(names: &'a [String], params: &'a [NamedParam]) -> Vec<(&'a str, &'a dyn ToSql)> {
    names
        .iter()
        .zip(params)
        .map(|(name, p)| (name.as_str(), &p.value as &dyn ToSql))
        .collect()
}

fn map_query_error(err: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(code, _) = &err {
        let unique = matches!(
            code.extended_code,
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        );
        if code.code == ErrorCode::ConstraintViolation && unique {
            return Error::IntegrityConflict(err.to_string());
        }
    }
    Error::Database(err.to_string())
}
