use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rusqlite::{Rows, Statement};

use super::result_set::ResultSet;
use super::row::{DbRow, index_columns};
use crate::error::SqliteLeaseError;
use crate::sqlite::query::{extract_row, storage_types};
use crate::types::{ColumnType, RowValues, StorageType};

enum State {
    // First row, already stepped by `exec` but not yet handed out.
    Pending(Result<Vec<RowValues>, SqliteLeaseError>),
    Streaming,
    Exhausted,
}

/// Lazily produced rows of one executing statement.
///
/// A cursor borrows the [`StatementSet`](crate::sqlite::StatementSet) that
/// produced it, so it cannot outlive the set or survive the next `exec` call.
/// Dropping it resets the underlying statement.
pub struct Cursor<'s> {
    rows: Rows<'s>,
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
    decl_types: Vec<Option<String>>,
    current_types: Vec<StorageType>,
    state: State,
}

impl<'s> Cursor<'s> {
    /// Step `stmt` once and wrap whatever it produced.
    ///
    /// Both "row available" and "done" outcomes produce a cursor; only an engine
    /// failure is an error.
    pub(crate) fn start(stmt: &'s mut Statement<'_>) -> Result<Self, SqliteLeaseError> {
        let column_names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect();
        let decl_types = stmt
            .columns()
            .iter()
            .map(|col| col.decl_type().map(str::to_owned))
            .collect();
        let column_count = column_names.len();

        let mut rows = stmt.raw_query();
        let (state, current_types) = match rows.next()? {
            Some(row) => (
                State::Pending(extract_row(row, column_count)),
                storage_types(row, column_count)?,
            ),
            None => (State::Exhausted, Vec::new()),
        };

        Ok(Self {
            rows,
            column_index: Arc::new(index_columns(&column_names)),
            column_names: Arc::new(column_names),
            decl_types,
            current_types,
            state,
        })
    }

    /// Advance to the next row, decoding each column natively.
    ///
    /// Returns `Ok(None)` once the statement has no more rows.
    ///
    /// # Errors
    /// Propagates engine failures raised while stepping.
    pub fn next_row(&mut self) -> Result<Option<DbRow>, SqliteLeaseError> {
        self.next_typed(&[])
    }

    /// Advance to the next row, coercing column `i` to `types[i]`.
    ///
    /// Columns beyond the end of `types` keep their native type; extra entries
    /// are ignored.
    ///
    /// # Errors
    /// Returns [`SqliteLeaseError::Coercion`] if a requested conversion is not
    /// possible or stored text is not valid UTF-8 (the cursor stays usable in
    /// both cases), or the engine error raised while
    /// stepping (the cursor is then exhausted).
    pub fn next_typed(&mut self, types: &[ColumnType]) -> Result<Option<DbRow>, SqliteLeaseError> {
        let values = match std::mem::replace(&mut self.state, State::Streaming) {
            State::Pending(values) => values?,
            State::Exhausted => {
                self.state = State::Exhausted;
                return Ok(None);
            }
            State::Streaming => match self.rows.next() {
                Ok(Some(row)) => {
                    self.current_types = storage_types(row, self.column_names.len())?;
                    extract_row(row, self.column_names.len())?
                }
                Ok(None) => {
                    self.state = State::Exhausted;
                    return Ok(None);
                }
                Err(err) => {
                    self.state = State::Exhausted;
                    return Err(err.into());
                }
            },
        };
        let values = values
            .into_iter()
            .enumerate()
            .map(|(idx, value)| match types.get(idx) {
                Some(&target) => value.coerce(idx, target),
                None => Ok(value),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(DbRow::with_cache(
            Arc::clone(&self.column_names),
            Arc::clone(&self.column_index),
            values,
        )))
    }

    /// Whether the statement has reported that no rows remain.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.column_names.as_ref().clone()
    }

    /// Declared types from the table definition; `None` for expressions.
    #[must_use]
    pub fn column_decl_types(&self) -> Vec<Option<String>> {
        self.decl_types.clone()
    }

    /// Storage types of the current row (the pending row before the first
    /// `next`, the most recently returned row afterwards).
    ///
    /// # Errors
    /// Returns [`SqliteLeaseError::CursorExhausted`] once the cursor has reported
    /// that no rows remain.
    pub fn column_types(&self) -> Result<Vec<StorageType>, SqliteLeaseError> {
        if self.is_exhausted() {
            return Err(SqliteLeaseError::CursorExhausted);
        }
        Ok(self.current_types.clone())
    }

    /// Drain the remaining rows into memory.
    ///
    /// # Errors
    /// Propagates the first stepping failure.
    pub fn collect_all(mut self) -> Result<ResultSet, SqliteLeaseError> {
        let mut result_set = ResultSet::with_capacity(10);
        result_set.set_column_names(Arc::clone(&self.column_names));
        while let Some(row) = self.next_row()? {
            result_set.add_row_values(row.into_values());
        }
        Ok(result_set)
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<DbRow, SqliteLeaseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("column_names", &self.column_names)
            .field("exhausted", &self.is_exhausted())
            .finish_non_exhaustive()
    }
}
