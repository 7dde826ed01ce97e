use async_trait::async_trait;
use sqlmig_common::{Error, Result};
use std::time::Duration;

/// A typed value bound to, or read from, a SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One `:name` placeholder and its value.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedParam {
    pub name: String,
    pub value: SqlValue,
}

/// Build a named parameter; `name` is given without the leading `:`.
pub fn param(name: impl Into<String>, value: impl Into<SqlValue>) -> NamedParam {
    NamedParam {
        name: name.into(),
        value: value.into(),
    }
}

/// A result row addressed by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Result<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| Error::Database(format!("column {column} not present in row")))
    }

    pub fn get_i64(&self, column: &str) -> Result<i64> {
        self.get_opt_i64(column)?
            .ok_or_else(|| Error::Database(format!("column {column} is NULL")))
    }

    pub fn get_opt_i64(&self, column: &str) -> Result<Option<i64>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Integer(v) => Ok(Some(*v)),
            other => Err(type_mismatch(column, "integer", other)),
        }
    }

    pub fn get_string(&self, column: &str) -> Result<String> {
        self.get_opt_string(column)?
            .ok_or_else(|| Error::Database(format!("column {column} is NULL")))
    }

    pub fn get_opt_string(&self, column: &str) -> Result<Option<String>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(v) => Ok(Some(v.clone())),
            other => Err(type_mismatch(column, "text", other)),
        }
    }
}

fn type_mismatch(column: &str, expected: &str, actual: &SqlValue) -> Error {
    Error::Database(format!(
        "column {column}: expected {expected}, found {actual:?}"
    ))
}

/// Parameterized SQL primitive the migration engine runs on.
///
/// Every call acquires its own connection and releases it before returning,
/// on the error path as well.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// First column of the first row, or `None` when the query yields no rows.
    async fn query_scalar(&self, sql: &str, params: &[NamedParam]) -> Result<Option<SqlValue>>;

    /// Run a single statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[NamedParam]) -> Result<usize>;

    async fn query_rows(&self, sql: &str, params: &[NamedParam]) -> Result<Vec<Row>>;

    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Run raw statement batches in order on one connection, each bounded by `timeout`.
    /// Stops at the first failing batch.
    async fn execute_batches(&self, batches: &[String], timeout: Duration) -> Result<()>;
}
