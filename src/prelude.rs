//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::error::{AggregateError, SqliteLeaseError};
pub use crate::pool::{ErrorSink, Pool, PoolConfig, PoolConfigBuilder, PooledConnection};
pub use crate::results::{Cursor, DbRow, ResultSet};
pub use crate::sqlite::{
    AuthAction, AuthContext, Authorizer, Binding, Conn, StatementSet, TransactionMode,
    UpdateAction,
};
pub use crate::types::{ColumnType, RowValues, StorageType};
