use std::fmt;

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::SqliteLeaseError;

/// Values that can be stored in a database row or used as query parameters.
///
/// The same enum is used on both sides of the engine boundary:
/// ```rust
/// use sqlite_lease::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
///
/// Natively decoded columns only ever produce `Null`, `Int`, `Float`, `Text` or
/// `Blob`; the remaining variants come from an explicit [`ColumnType`] request.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value, bound as integer 0/1
    Bool(bool),
    /// Timestamp value, bound as `%F %T%.f` text
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value, bound as its serialized text
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            return parse_timestamp(s);
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Storage class this value occupies once bound.
    #[must_use]
    pub fn storage_type(&self) -> StorageType {
        match self {
            RowValues::Null => StorageType::Null,
            RowValues::Int(_) | RowValues::Bool(_) => StorageType::Integer,
            RowValues::Float(_) => StorageType::Float,
            RowValues::Text(_) | RowValues::Timestamp(_) | RowValues::JSON(_) => StorageType::Text,
            RowValues::Blob(_) => StorageType::Blob,
        }
    }

    /// Convert this value to the requested column type.
    ///
    /// `Null` stays `Null` for every target. Conversions follow the engine's own
    /// affinity rules where they are lossless enough to be useful (integer text
    /// to `Int`, integers to `Float`, numbers to `Text`), and fail where the
    /// engine would silently produce garbage (non-numeric text to a number).
    ///
    /// # Errors
    /// Returns [`SqliteLeaseError::Coercion`] naming `column` when the value
    /// cannot be represented as `target`.
    pub fn coerce(self, column: usize, target: ColumnType) -> Result<RowValues, SqliteLeaseError> {
        let found = self.storage_type();
        let fail = || SqliteLeaseError::Coercion {
            column,
            found,
            target,
        };
        if self.is_null() || target == ColumnType::Native {
            return Ok(self);
        }
        let converted = match (target, self) {
            (ColumnType::Integer, RowValues::Int(i)) => Some(RowValues::Int(i)),
            (ColumnType::Integer, RowValues::Bool(b)) => Some(RowValues::Int(i64::from(b))),
            (ColumnType::Integer, RowValues::Float(f)) => float_to_int(f).map(RowValues::Int),
            (ColumnType::Integer, RowValues::Text(s)) => parse_integer(&s).map(RowValues::Int),

            #[allow(clippy::cast_precision_loss)]
            (ColumnType::Float, RowValues::Int(i)) => Some(RowValues::Float(i as f64)),
            (ColumnType::Float, RowValues::Float(f)) => Some(RowValues::Float(f)),
            (ColumnType::Float, RowValues::Text(s)) => {
                s.trim().parse::<f64>().ok().map(RowValues::Float)
            }

            (ColumnType::Text, RowValues::Text(s)) => Some(RowValues::Text(s)),
            (ColumnType::Text, RowValues::Int(i)) => Some(RowValues::Text(i.to_string())),
            (ColumnType::Text, RowValues::Float(f)) => Some(RowValues::Text(f.to_string())),
            (ColumnType::Text, RowValues::Blob(b)) => String::from_utf8(b).ok().map(RowValues::Text),

            (ColumnType::Blob, RowValues::Blob(b)) => Some(RowValues::Blob(b)),
            (ColumnType::Blob, RowValues::Text(s)) => Some(RowValues::Blob(s.into_bytes())),
            (ColumnType::Blob, RowValues::Int(i)) => Some(RowValues::Blob(i.to_string().into_bytes())),
            (ColumnType::Blob, RowValues::Float(f)) => {
                Some(RowValues::Blob(f.to_string().into_bytes()))
            }

            (ColumnType::Bool, RowValues::Bool(b)) => Some(RowValues::Bool(b)),
            (ColumnType::Bool, RowValues::Int(i)) => Some(RowValues::Bool(i != 0)),
            (ColumnType::Bool, RowValues::Text(s)) => parse_bool(&s).map(RowValues::Bool),

            (ColumnType::Timestamp, RowValues::Timestamp(ts)) => Some(RowValues::Timestamp(ts)),
            (ColumnType::Timestamp, RowValues::Text(s)) => {
                parse_timestamp(&s).map(RowValues::Timestamp)
            }
            (ColumnType::Timestamp, RowValues::Int(secs)) => {
                chrono::DateTime::from_timestamp(secs, 0)
                    .map(|dt| RowValues::Timestamp(dt.naive_utc()))
            }

            (ColumnType::Json, RowValues::JSON(v)) => Some(RowValues::JSON(v)),
            (ColumnType::Json, RowValues::Text(s)) => {
                serde_json::from_str(&s).ok().map(RowValues::JSON)
            }
            (ColumnType::Json, RowValues::Int(i)) => Some(RowValues::JSON(JsonValue::from(i))),
            (ColumnType::Json, RowValues::Float(f)) => {
                serde_json::Number::from_f64(f).map(|n| RowValues::JSON(JsonValue::Number(n)))
            }
            (ColumnType::Json, RowValues::Bool(b)) => Some(RowValues::JSON(JsonValue::Bool(b))),
            _ => None,
        };
        converted.ok_or_else(fail)
    }
}

fn parse_integer(s: &str) -> Option<i64> {
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(i);
    }
    trimmed.parse::<f64>().ok().and_then(float_to_int)
}

// Truncates toward zero; `None` for NaN, infinities and anything outside i64.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn float_to_int(f: f64) -> Option<i64> {
    let truncated = f.trunc();
    // i64::MAX as f64 rounds up to 2^63, which is already out of range.
    (truncated >= i64::MIN as f64 && truncated < i64::MAX as f64).then(|| truncated as i64)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let s = s.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

macro_rules! row_value_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for RowValues {
                fn from(value: $t) -> Self {
                    RowValues::Int(i64::from(value))
                }
            }
        )*
    };
}

row_value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl TryFrom<u64> for RowValues {
    type Error = SqliteLeaseError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value).map(RowValues::Int).map_err(|_| {
            SqliteLeaseError::ParameterError(format!("{value} does not fit in a 64-bit integer"))
        })
    }
}

impl TryFrom<usize> for RowValues {
    type Error = SqliteLeaseError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        i64::try_from(value).map(RowValues::Int).map_err(|_| {
            SqliteLeaseError::ParameterError(format!("{value} does not fit in a 64-bit integer"))
        })
    }
}

impl From<f32> for RowValues {
    fn from(value: f32) -> Self {
        RowValues::Float(f64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_owned())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<Vec<u8>> for RowValues {
    fn from(value: Vec<u8>) -> Self {
        RowValues::Blob(value)
    }
}

impl From<&[u8]> for RowValues {
    fn from(value: &[u8]) -> Self {
        RowValues::Blob(value.to_vec())
    }
}

impl From<NaiveDateTime> for RowValues {
    fn from(value: NaiveDateTime) -> Self {
        RowValues::Timestamp(value)
    }
}

impl From<JsonValue> for RowValues {
    fn from(value: JsonValue) -> Self {
        RowValues::JSON(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// Storage class of a value inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Null,
    Integer,
    Float,
    Text,
    Blob,
}

impl From<rusqlite::types::Type> for StorageType {
    fn from(value: rusqlite::types::Type) -> Self {
        match value {
            rusqlite::types::Type::Null => StorageType::Null,
            rusqlite::types::Type::Integer => StorageType::Integer,
            rusqlite::types::Type::Real => StorageType::Float,
            rusqlite::types::Type::Text => StorageType::Text,
            rusqlite::types::Type::Blob => StorageType::Blob,
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageType::Null => "NULL",
            StorageType::Integer => "INTEGER",
            StorageType::Float => "FLOAT",
            StorageType::Text => "TEXT",
            StorageType::Blob => "BLOB",
        };
        f.write_str(name)
    }
}

/// Requested type for a column when reading a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColumnType {
    /// Keep whatever the engine stored.
    #[default]
    Native,
    Integer,
    Float,
    Text,
    Blob,
    Bool,
    Timestamp,
    Json,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Native => "native",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Blob => "blob",
            ColumnType::Bool => "bool",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Json => "json",
        };
        f.write_str(name)
    }
}
