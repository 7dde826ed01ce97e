use std::path::PathBuf;

use thiserror::Error;

use crate::types::RunSummary;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot read {}: {message}", path.display())]
    FileAccess { path: PathBuf, message: String },

    #[error("connection failed: {0}")]
    Connectivity(String),

    #[error("migration {migration_id} failed: {message}")]
    Execution {
        migration_id: String,
        message: String,
        /// Progress made by the run before it was aborted.
        summary: Box<RunSummary>,
    },

    #[error("ledger integrity conflict: {0}")]
    IntegrityConflict(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn file_access(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::FileAccess {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_error_names_the_migration() {
        let err = Error::Execution {
            migration_id: "0002_users".into(),
            message: "no such table: accounts".into(),
            summary: Box::default(),
        };
        assert_eq!(
            err.to_string(),
            "migration 0002_users failed: no such table: accounts"
        );
    }

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn read() -> Result<String> {
            Ok(std::fs::read_to_string("/nonexistent/sqlmig/config.yml")?)
        }
        assert!(matches!(read(), Err(Error::Io(_))));
    }

    #[test]
    fn file_access_error_includes_path() {
        let err = Error::file_access("/tmp/missing.sql", "permission denied");
        let text = err.to_string();
        assert!(text.contains("/tmp/missing.sql"));
        assert!(text.contains("permission denied"));
    }
}
