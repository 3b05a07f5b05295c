use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ColumnType, StorageType};

#[derive(Debug, Error)]
pub enum SqliteLeaseError {
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Maximum number of connections ({max}) reached")]
    PoolExhausted { max: usize },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Invalid schema name: {0:?}")]
    InvalidSchemaName(String),

    #[error("No default schema {0:?} found")]
    MissingDefaultSchema(String),

    #[error("Database does not exist: {0:?}")]
    StoreNotFound(PathBuf),

    #[error("Cannot convert column {column} ({found}) to {target}")]
    Coercion {
        column: usize,
        found: StorageType,
        target: ColumnType,
    },

    #[error("Cursor is exhausted")]
    CursorExhausted,

    #[error("Connection lease already released")]
    LeaseReleased,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl SqliteLeaseError {
    /// The engine reported `SQLITE_BUSY` (or one of its extended codes).
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.sqlite_code() == Some(rusqlite::ErrorCode::DatabaseBusy)
    }

    /// The engine reported `SQLITE_INTERRUPT`, e.g. a progress handler aborted the step.
    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        self.sqlite_code() == Some(rusqlite::ErrorCode::OperationInterrupted)
    }

    /// Primary engine result code, when this error came from the engine.
    #[must_use]
    pub fn sqlite_code(&self) -> Option<rusqlite::ErrorCode> {
        match self {
            SqliteLeaseError::SqliteError(err) => err.sqlite_error_code(),
            _ => None,
        }
    }
}

/// Several independent failures collected from one operation.
///
/// Produced when finalizing a statement set or attaching the configured schemas
/// of a new connection: every sub-operation runs, and the failures are reported
/// together instead of stopping at the first.
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<SqliteLeaseError>,
}

impl AggregateError {
    #[must_use]
    pub fn errors(&self) -> &[SqliteLeaseError] {
        &self.errors
    }

    #[must_use]
    pub fn into_errors(self) -> Vec<SqliteLeaseError> {
        self.errors
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n\t* {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// Fold collected failures into a single result.
///
/// No failures yields `Ok(())`; a single failure is returned as-is; more than
/// one is wrapped in [`SqliteLeaseError::Aggregate`].
///
/// # Errors
/// Returns the folded error whenever `errors` is non-empty.
pub fn aggregate(mut errors: Vec<SqliteLeaseError>) -> Result<(), SqliteLeaseError> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(SqliteLeaseError::Aggregate(AggregateError { errors })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_of_nothing_is_ok() {
        assert!(aggregate(Vec::new()).is_ok());
    }

    #[test]
    fn aggregate_of_one_passes_through() {
        let err = aggregate(vec![SqliteLeaseError::InvalidSchemaName("1bad".into())])
            .expect_err("single error");
        assert!(matches!(err, SqliteLeaseError::InvalidSchemaName(name) if name == "1bad"));
    }

    #[test]
    fn aggregate_of_many_keeps_every_error() {
        let err = aggregate(vec![
            SqliteLeaseError::InvalidSchemaName("1bad".into()),
            SqliteLeaseError::StoreNotFound(PathBuf::from("/nope.db")),
        ])
        .expect_err("two errors");
        let SqliteLeaseError::Aggregate(agg) = err else {
            panic!("expected aggregate");
        };
        assert_eq!(agg.len(), 2);
        let text = agg.to_string();
        assert!(text.starts_with("2 errors occurred:"));
        assert!(text.contains("1bad"));
        assert!(text.contains("/nope.db"));
    }
}
