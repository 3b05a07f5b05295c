//! Row-level access to statement output.
//!
//! - cursor: lazily stepped rows of one executing statement
//! - row: a single decoded row
//! - result_set: rows drained into memory

pub mod cursor;
pub mod result_set;
pub mod row;

pub use cursor::Cursor;
pub use result_set::ResultSet;
pub use row::DbRow;
