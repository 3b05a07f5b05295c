use std::fmt;

use super::Conn;
use crate::error::SqliteLeaseError;

/// Locking behaviour requested by `BEGIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionMode::Deferred => "DEFERRED",
            TransactionMode::Immediate => "IMMEDIATE",
            TransactionMode::Exclusive => "EXCLUSIVE",
        })
    }
}

impl Conn {
    /// Begin a transaction.
    ///
    /// # Errors
    /// Returns `ExecutionError` if a transaction is already open, or the
    /// engine error.
    pub fn begin(&self, mode: TransactionMode) -> Result<(), SqliteLeaseError> {
        if !self.is_autocommit() {
            return Err(SqliteLeaseError::ExecutionError(
                "SQLite transaction already in progress".into(),
            ));
        }
        self.conn.execute_batch(&format!("BEGIN {mode}"))?;
        Ok(())
    }

    /// # Errors
    /// Returns `ExecutionError` if no transaction is open, or the engine error.
    pub fn commit(&self) -> Result<(), SqliteLeaseError> {
        self.ensure_in_transaction()?;
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// # Errors
    /// Returns `ExecutionError` if no transaction is open, or the engine error.
    pub fn rollback(&self) -> Result<(), SqliteLeaseError> {
        self.ensure_in_transaction()?;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    /// Whether the connection is outside any explicit transaction.
    #[must_use]
    pub fn is_autocommit(&self) -> bool {
        self.conn.is_autocommit()
    }

    /// Run `func` inside a transaction, committing on `Ok` and rolling back
    /// on `Err`.
    ///
    /// # Errors
    /// Returns the error from `func` (after rollback), or a begin/commit
    /// failure. A failed rollback is logged and the original error returned.
    pub fn transaction<F, R>(&mut self, mode: TransactionMode, func: F) -> Result<R, SqliteLeaseError>
    where
        F: FnOnce(&mut Conn) -> Result<R, SqliteLeaseError>,
    {
        self.begin(mode)?;
        match func(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if !self.is_autocommit() {
                    if let Err(rollback_err) = self.rollback() {
                        tracing::warn!(%rollback_err, "rollback after failed transaction body failed");
                    }
                }
                Err(err)
            }
        }
    }

    fn ensure_in_transaction(&self) -> Result<(), SqliteLeaseError> {
        if self.is_autocommit() {
            Err(SqliteLeaseError::ExecutionError(
                "SQLite transaction not active".into(),
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(conn: &Conn) -> i64 {
        conn.raw()
            .query_row("SELECT count(*) FROM t", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn failed_body_rolls_back() {
        let mut conn = Conn::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();

        let result: Result<(), _> = conn.transaction(TransactionMode::Immediate, |tx| {
            tx.execute_batch("INSERT INTO t VALUES (1)")?;
            Err(SqliteLeaseError::ExecutionError("stop".into()))
        });
        assert!(result.is_err());
        assert!(conn.is_autocommit());
        assert_eq!(count(&conn), 0);

        conn.transaction(TransactionMode::Deferred, |tx| {
            tx.execute_batch("INSERT INTO t VALUES (1)")
        })
        .unwrap();
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn commit_without_begin_is_an_error() {
        let conn = Conn::open_in_memory().unwrap();
        assert!(matches!(
            conn.commit(),
            Err(SqliteLeaseError::ExecutionError(_))
        ));
        conn.begin(TransactionMode::Exclusive).unwrap();
        assert!(conn.begin(TransactionMode::Deferred).is_err());
        conn.rollback().unwrap();
    }
}
