mod attach;
mod hooks;
mod tx;

use std::fmt;
use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use super::statement::StatementSet;
use crate::error::SqliteLeaseError;
use crate::results::DbRow;

pub use hooks::{AuthAction, AuthContext, Authorizer, UpdateAction};
pub use tx::TransactionMode;

/// Path that selects a private in-memory store.
pub const MEMORY: &str = ":memory:";

/// Flags used when none are configured: read-write, create if missing, URI
/// file names allowed, and no engine-level mutex since a connection is only
/// ever touched by one task at a time.
#[must_use]
pub fn default_open_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

/// One open engine connection.
///
/// `Conn` is what a lease hands to closures run through
/// [`PooledConnection::with_connection`](crate::pool::PooledConnection::with_connection).
/// It can also be used on its own outside a pool.
pub struct Conn {
    conn: Connection,
    trace: bool,
}

impl Conn {
    /// Open the store at `path`. An empty path or `":memory:"` opens a private
    /// in-memory store.
    ///
    /// # Errors
    /// Returns the engine error if the store cannot be opened with `flags`.
    pub fn open(path: impl AsRef<Path>, flags: OpenFlags) -> Result<Self, SqliteLeaseError> {
        let path = path.as_ref();
        let conn = if is_memory(path) {
            Connection::open_in_memory_with_flags(
                flags | OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            )?
        } else {
            Connection::open_with_flags(path, flags)?
        };
        tracing::debug!(path = %path.display(), ?flags, "opened sqlite connection");
        Ok(Self { conn, trace: false })
    }

    /// Open a private in-memory store with the default flags.
    ///
    /// # Errors
    /// Returns the engine error if the store cannot be created.
    pub fn open_in_memory() -> Result<Self, SqliteLeaseError> {
        Self::open(MEMORY, default_open_flags())
    }

    /// Compile `text` into a [`StatementSet`].
    ///
    /// # Errors
    /// Returns the first compile error; nothing stays allocated in that case.
    #[track_caller]
    pub fn prepare(&self, text: &str) -> Result<StatementSet<'_>, SqliteLeaseError> {
        StatementSet::prepare(&self.conn, text)
    }

    /// Run every statement in `text`, discarding rows.
    ///
    /// # Errors
    /// Returns the engine error of the first failing statement.
    pub fn execute_batch(&self, text: &str) -> Result<(), SqliteLeaseError> {
        self.conn.execute_batch(text)?;
        Ok(())
    }

    /// Run every statement in `text` in order and hand each produced row to
    /// `callback`. Returning `true` from the callback stops early.
    ///
    /// # Errors
    /// Returns compile or step failures; finalize failures are reported only
    /// when everything else succeeded.
    #[track_caller]
    pub fn exec_with<F>(&self, text: &str, mut callback: F) -> Result<(), SqliteLeaseError>
    where
        F: FnMut(&DbRow) -> bool,
    {
        let mut set = self.prepare(text)?;
        let outcome = stream_rows(&mut set, &mut callback);
        let closed = set.close();
        outcome.and(closed)
    }

    /// Rowid of the most recent successful insert.
    #[must_use]
    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Rows changed by the most recent statement.
    #[must_use]
    pub fn changes(&self) -> u64 {
        self.conn.changes()
    }

    /// Whether trace logging was enabled with [`set_trace`](Self::set_trace).
    #[must_use]
    pub fn is_tracing(&self) -> bool {
        self.trace
    }

    /// Direct access to the engine connection for anything this type does
    /// not wrap.
    #[must_use]
    pub fn raw(&self) -> &Connection {
        &self.conn
    }

    pub fn raw_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Close the connection and surface the engine's close error.
    ///
    /// # Errors
    /// Returns the engine error if the close is refused.
    pub fn close(self) -> Result<(), SqliteLeaseError> {
        self.conn.close().map_err(|(_, err)| err.into())
    }
}

fn stream_rows<F>(set: &mut StatementSet<'_>, callback: &mut F) -> Result<(), SqliteLeaseError>
where
    F: FnMut(&DbRow) -> bool,
{
    for index in 0.. {
        let Some(mut cursor) = set.exec(index, &[])? else {
            break;
        };
        while let Some(row) = cursor.next_row()? {
            if callback(&row) {
                return Ok(());
            }
        }
    }
    Ok(())
}

pub(crate) fn is_memory(path: &Path) -> bool {
    path.as_os_str().is_empty() || path.as_os_str() == MEMORY
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("path", &self.conn.path())
            .field("trace", &self.trace)
            .field("autocommit", &self.conn.is_autocommit())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_with_visits_rows_of_every_statement() {
        let conn = Conn::open_in_memory().unwrap();
        let mut seen = Vec::new();
        conn.exec_with("SELECT 1 UNION ALL SELECT 2; SELECT 3", |row| {
            seen.push(*row.get_by_index(0).unwrap().as_int().unwrap());
            false
        })
        .unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn exec_with_stops_when_callback_asks() {
        let conn = Conn::open_in_memory().unwrap();
        let mut calls = 0;
        conn.exec_with("SELECT 1 UNION ALL SELECT 2 UNION ALL SELECT 3", |_| {
            calls += 1;
            true
        })
        .unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn empty_path_is_memory() {
        assert!(is_memory(Path::new("")));
        assert!(is_memory(Path::new(MEMORY)));
        assert!(!is_memory(Path::new("data.db")));
    }
}
