use std::fmt;
use std::panic::Location;

use rusqlite::{Batch, Connection, Statement};

use super::params::{Binding, bind};
use crate::error::{SqliteLeaseError, aggregate};
use crate::results::Cursor;
use crate::types::RowValues;

/// The compiled form of one SQL text blob, possibly holding several
/// `;`-separated statements.
///
/// Statements are executed by index with [`exec`](Self::exec). The set must be
/// closed with [`close`](Self::close); dropping an unclosed set is reported
/// with the location of the `prepare` call that created it (a panic in debug
/// builds, an error event in release builds).
#[must_use = "a statement set must be closed with `close()`"]
pub struct StatementSet<'conn> {
    statements: Vec<Statement<'conn>>,
    closed: bool,
    origin: &'static Location<'static>,
}

impl<'conn> StatementSet<'conn> {
    /// Compile every statement in `text`, in order.
    ///
    /// Fails atomically: statements already compiled by this call are
    /// finalized before the error is returned.
    #[track_caller]
    pub(crate) fn prepare(conn: &'conn Connection, text: &str) -> Result<Self, SqliteLeaseError> {
        let origin = Location::caller();
        let mut statements = Vec::new();
        let mut batch = Batch::new(conn, text.trim());
        loop {
            match batch.next() {
                Ok(Some(stmt)) => statements.push(stmt),
                Ok(None) => break,
                Err(err) => {
                    for stmt in statements {
                        if let Err(finalize_err) = stmt.finalize() {
                            tracing::debug!(%finalize_err, "finalize after failed prepare");
                        }
                    }
                    return Err(err.into());
                }
            }
        }
        tracing::trace!(count = statements.len(), %origin, "prepared statement set");
        Ok(Self {
            statements,
            closed: false,
            origin,
        })
    }

    /// Number of compiled statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Declared parameter count of statement `index`.
    #[must_use]
    pub fn parameter_count(&self, index: usize) -> Option<usize> {
        self.statements.get(index).map(Statement::parameter_count)
    }

    /// Whether statement `index` leaves the database unchanged.
    #[must_use]
    pub fn readonly(&self, index: usize) -> Option<bool> {
        self.statements.get(index).map(Statement::readonly)
    }

    /// Run statement `index` with positional parameters.
    ///
    /// Returns `Ok(None)` when `index` is past the last statement; that marks
    /// the normal end of the sequence and is not an error. Otherwise the
    /// statement is reset, every parameter defaults to NULL, `params` are bound
    /// in order, and the statement is stepped once.
    ///
    /// # Errors
    /// Propagates bind and step failures from the engine.
    ///
    /// # Panics
    /// Panics if the set has already been closed.
    pub fn exec(
        &mut self,
        index: usize,
        params: &[RowValues],
    ) -> Result<Option<Cursor<'_>>, SqliteLeaseError> {
        self.exec_with(index, Binding::Positional(params))
    }

    /// Run statement `index` binding parameters by name.
    ///
    /// # Errors
    /// Fails for unknown parameter names and propagates engine failures.
    ///
    /// # Panics
    /// Panics if the set has already been closed.
    pub fn exec_named(
        &mut self,
        index: usize,
        params: &[(&str, RowValues)],
    ) -> Result<Option<Cursor<'_>>, SqliteLeaseError> {
        self.exec_with(index, Binding::Named(params))
    }

    /// Run statement `index` with an explicit [`Binding`].
    ///
    /// # Errors
    /// See [`exec`](Self::exec).
    ///
    /// # Panics
    /// Panics if the set has already been closed.
    pub fn exec_with(
        &mut self,
        index: usize,
        binding: Binding<'_>,
    ) -> Result<Option<Cursor<'_>>, SqliteLeaseError> {
        assert!(
            !self.closed,
            "{}: statement set used after close()",
            self.origin
        );
        let Some(stmt) = self.statements.get_mut(index) else {
            return Ok(None);
        };
        bind(stmt, binding)?;
        Cursor::start(stmt).map(Some)
    }

    /// Finalize every compiled statement.
    ///
    /// All statements are finalized even if some fail; the failures are
    /// returned together. Closing an already closed set is a no-op.
    ///
    /// # Errors
    /// Returns the folded finalize failures.
    pub fn close(&mut self) -> Result<(), SqliteLeaseError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let errors = self
            .statements
            .drain(..)
            .filter_map(|stmt| stmt.finalize().err())
            .map(SqliteLeaseError::from)
            .collect();
        aggregate(errors)
    }
}

impl Drop for StatementSet<'_> {
    fn drop(&mut self) {
        if self.closed || self.statements.is_empty() {
            return;
        }
        if cfg!(debug_assertions) && !std::thread::panicking() {
            panic!("{}: prepare() missing call to close()", self.origin);
        }
        tracing::error!(origin = %self.origin, "prepare() missing call to close()");
    }
}

impl fmt::Debug for StatementSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sql: Vec<String> = self
            .statements
            .iter()
            .map(|stmt| stmt.expanded_sql().unwrap_or_default())
            .collect();
        f.debug_struct("StatementSet")
            .field("statements", &sql)
            .field("closed", &self.closed)
            .field("origin", &format_args!("{}", self.origin))
            .finish()
    }
}
