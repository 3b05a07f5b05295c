use std::collections::HashMap;
use std::sync::Arc;

use super::row::{DbRow, index_columns};
use crate::types::RowValues;

/// Rows drained from a cursor into memory.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the statement
    pub results: Vec<DbRow>,
    /// Number of rows collected
    pub rows_affected: usize,
    column_names: Option<Arc<Vec<String>>>,
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl ResultSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            ..ResultSet::default()
        }
    }

    /// Set the column names for this result set (to be shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index_cache = Arc::new(index_columns(&column_names));
        self.column_names = Some(column_names);
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Add a row of values sharing this set's column names.
    ///
    /// Ignored until column names have been set.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        if let Some(column_names) = &self.column_names {
            self.results.push(DbRow::with_cache(
                Arc::clone(column_names),
                Arc::clone(&self.column_index_cache),
                row_values,
            ));
            self.rows_affected += 1;
        }
    }

    /// Add an already-built row.
    pub fn add_row(&mut self, row: DbRow) {
        if self.column_names.is_none() {
            self.set_column_names(Arc::clone(&row.column_names));
        }
        self.results.push(row);
        self.rows_affected += 1;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
