use rusqlite::types::ValueRef;

use crate::error::SqliteLeaseError;
use crate::types::{ColumnType, RowValues, StorageType};

/// Extract a `RowValues` from a `SQLite` row using the native storage mapping.
///
/// # Errors
///
/// Returns `SqliteLeaseError` if the column cannot be read, or a
/// `Coercion` error if stored text is not valid UTF-8.
pub fn sqlite_extract_value_sync(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> Result<RowValues, SqliteLeaseError> {
    let value = row.get_ref(idx)?;
    Ok(match value {
        ValueRef::Null => RowValues::Null,
        ValueRef::Integer(i) => RowValues::Int(i),
        ValueRef::Real(f) => RowValues::Float(f),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => RowValues::Text(text.to_owned()),
            Err(_) => {
                return Err(SqliteLeaseError::Coercion {
                    column: idx,
                    found: StorageType::Text,
                    target: ColumnType::Text,
                });
            }
        },
        ValueRef::Blob(b) => RowValues::Blob(b.to_vec()),
    })
}

/// Read every column of `row`.
///
/// # Errors
///
/// Returns `SqliteLeaseError` if any column cannot be read.
pub fn extract_row(
    row: &rusqlite::Row<'_>,
    column_count: usize,
) -> Result<Vec<RowValues>, SqliteLeaseError> {
    let mut values = Vec::with_capacity(column_count);
    for idx in 0..column_count {
        values.push(sqlite_extract_value_sync(row, idx)?);
    }
    Ok(values)
}

/// Storage class of every column of `row`.
///
/// # Errors
///
/// Returns `SqliteLeaseError` if any column cannot be read.
pub fn storage_types(
    row: &rusqlite::Row<'_>,
    column_count: usize,
) -> Result<Vec<StorageType>, SqliteLeaseError> {
    (0..column_count)
        .map(|idx| Ok(StorageType::from(row.get_ref(idx)?.data_type())))
        .collect()
}
