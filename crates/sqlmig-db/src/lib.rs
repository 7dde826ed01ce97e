//! Database-driver layer for SQLMig.
//!
//! The migration engine only talks to [`SqlExecutor`]; [`SqliteExecutor`] is the
//! shipped backend.

pub mod executor;
pub mod sqlite;

pub use executor::{NamedParam, Row, SqlExecutor, SqlValue, param};
pub use sqlite::SqliteExecutor;
