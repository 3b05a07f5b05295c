//! Bounded `SQLite` connection pooling with leases, multi-statement
//! statement sets, and streaming result cursors.
//!
//! ```rust,no_run
//! use sqlite_lease::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), SqliteLeaseError> {
//! let pool = Pool::new("app.db", None)?;
//! let cancel = CancellationToken::new();
//! let lease = pool.get(&cancel).expect("pool has capacity");
//!
//! let total = lease
//!     .with_connection(|conn| {
//!         let mut set = conn.prepare("CREATE TABLE IF NOT EXISTS t (v INTEGER); SELECT count(*) FROM t")?;
//!         set.exec(0, &[])?;
//!         let count = match set.exec(1, &[])? {
//!             Some(mut cursor) => cursor.next_row()?.and_then(|row| row.get_by_index(0).and_then(|v| v.as_int().copied())),
//!             None => None,
//!         };
//!         set.close()?;
//!         Ok(count.unwrap_or_default())
//!     })
//!     .await?;
//! println!("{total} rows");
//!
//! pool.put(lease);
//! pool.close().await?;
//! # Ok(()) }
//! ```

pub mod error;
pub mod pool;
pub mod prelude;
pub mod quote;
pub mod results;
pub mod sqlite;
pub mod types;

pub use error::{AggregateError, SqliteLeaseError, aggregate};
pub use pool::{ErrorSink, Pool, PoolConfig, PoolConfigBuilder, PooledConnection};
pub use results::{Cursor, DbRow, ResultSet};
pub use sqlite::{Binding, Conn, StatementSet, TransactionMode};
pub use types::{ColumnType, RowValues, StorageType};
