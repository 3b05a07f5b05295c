use std::collections::HashMap;
use std::sync::Arc;

use crate::types::RowValues;

/// A row produced by a [`Cursor`](super::Cursor).
///
/// Column names are shared across every row of the same statement execution.
#[derive(Debug, Clone)]
pub struct DbRow {
    /// The column names for this row (shared across all rows of a result)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub rows: Vec<RowValues>,
    // Name -> index lookup shared with the sibling rows.
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl DbRow {
    /// Create a new database row, building a fresh name lookup.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, rows: Vec<RowValues>) -> Self {
        let cache = Arc::new(index_columns(&column_names));
        Self::with_cache(column_names, cache, rows)
    }

    pub(crate) fn with_cache(
        column_names: Arc<Vec<String>>,
        column_index_cache: Arc<HashMap<String, usize>>,
        rows: Vec<RowValues>,
    ) -> Self {
        Self {
            column_names,
            rows,
            column_index_cache,
        }
    }

    /// Get the index of a column by name
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }
        self.column_names.iter().position(|col| col == column_name)
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.rows.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.rows.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consume the row, keeping only the values.
    #[must_use]
    pub fn into_values(self) -> Vec<RowValues> {
        self.rows
    }
}

/// First occurrence wins for duplicated column names.
pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    let mut cache = HashMap::with_capacity(column_names.len());
    for (i, name) in column_names.iter().enumerate() {
        cache.entry(name.clone()).or_insert(i);
    }
    cache
}
