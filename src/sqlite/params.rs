use std::fmt::Write;

use rusqlite::Statement;
use rusqlite::types::Value;

use crate::error::SqliteLeaseError;
use crate::types::RowValues;

// Thread-local buffer for efficient timestamp formatting
thread_local! {
    static TIMESTAMP_BUF: std::cell::RefCell<String> = std::cell::RefCell::new(String::with_capacity(32));
}

/// Convert a single `RowValues` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => TIMESTAMP_BUF.with(|buf| {
            let mut borrow = buf.borrow_mut();
            borrow.clear();
            // Writing into a String cannot fail.
            let _ = write!(borrow, "{}", dt.format("%F %T%.f"));
            Value::Text(borrow.clone())
        }),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// How the values passed to `exec` are matched against a statement's parameters.
#[derive(Debug, Clone, Copy)]
pub enum Binding<'a> {
    /// Values bound to `?1`, `?2`, ... in order.
    Positional(&'a [RowValues]),
    /// Values bound by parameter name (`:name`, `@name`, `$name`; the prefix may be omitted).
    Named(&'a [(&'a str, RowValues)]),
}

impl Binding<'_> {
    fn is_empty(&self) -> bool {
        match self {
            Binding::Positional(values) => values.is_empty(),
            Binding::Named(values) => values.is_empty(),
        }
    }
}

/// Reset every parameter of `stmt` to NULL, then bind `binding` on top.
///
/// # Errors
/// Returns `SqliteLeaseError::ParameterError` for too many positional values or
/// an unknown parameter name, and propagates engine bind failures.
pub(crate) fn bind(stmt: &mut Statement<'_>, binding: Binding<'_>) -> Result<(), SqliteLeaseError> {
    let count = stmt.parameter_count();
    for idx in 1..=count {
        stmt.raw_bind_parameter(idx, Value::Null)?;
    }
    if binding.is_empty() {
        return Ok(());
    }

    match binding {
        Binding::Positional(values) => {
            if values.len() > count {
                return Err(SqliteLeaseError::ParameterError(format!(
                    "{} values supplied for {count} parameters",
                    values.len()
                )));
            }
            for (idx, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(idx + 1, row_value_to_sqlite_value(value))?;
            }
        }
        Binding::Named(values) => {
            for (name, value) in values {
                let idx = parameter_index(stmt, name)?.ok_or_else(|| {
                    SqliteLeaseError::ParameterError(format!("unknown parameter {name:?}"))
                })?;
                stmt.raw_bind_parameter(idx, row_value_to_sqlite_value(value))?;
            }
        }
    }
    Ok(())
}

fn parameter_index(stmt: &Statement<'_>, name: &str) -> Result<Option<usize>, SqliteLeaseError> {
    if name.starts_with([':', '@', '$']) {
        return Ok(stmt.parameter_index(name)?);
    }
    for prefix in [':', '@', '$'] {
        if let Some(idx) = stmt.parameter_index(&format!("{prefix}{name}"))? {
            return Ok(Some(idx));
        }
    }
    Ok(None)
}
