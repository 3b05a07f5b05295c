//! Bounded pool of engine connections handed out as leases.
//!
//! A lease is reclaimed when the holder drops it or passes it to
//! [`Pool::put`], when the cancellation token given to [`Pool::get`] fires,
//! or when the pool shuts down. Reclamation happens on a background task, so
//! the number of outstanding leases only drops once that task has run.

mod config;
mod connection;
mod sink;

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::OpenFlags;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub use config::{DEFAULT_MAX, MAIN_SCHEMA, PoolConfig, PoolConfigBuilder};
pub use connection::PooledConnection;
pub use sink::ErrorSink;

use connection::SharedConn;

use crate::error::{SqliteLeaseError, aggregate};
use crate::quote::is_valid_schema_name;
use crate::sqlite::{Conn, MEMORY};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A bounded set of connections sharing one configuration.
///
/// Cloning is cheap and every clone refers to the same pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    id: u64,
    config: PoolConfig,
    flags: OpenFlags,
    max: AtomicUsize,
    cur: AtomicUsize,
    idle: Mutex<Vec<Conn>>,
    sink: Option<ErrorSink>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    next_lease: AtomicU64,
}

impl Pool {
    /// Open a pool for `config`, creating one idle connection up front.
    ///
    /// Errors that surface later and cannot be returned to a caller are
    /// offered to `sink`.
    ///
    /// # Errors
    /// Returns `InvalidSchemaName` for a malformed schema name,
    /// `MissingDefaultSchema` when no `main` schema is configured, or the
    /// error raised while building the first connection.
    pub fn open(config: PoolConfig, sink: Option<ErrorSink>) -> Result<Self, SqliteLeaseError> {
        for name in config.schemas.keys() {
            let name = name.trim();
            if name != MAIN_SCHEMA && !is_valid_schema_name(name) {
                return Err(SqliteLeaseError::InvalidSchemaName(name.to_owned()));
            }
        }
        if !config.schemas.keys().any(|name| name.trim() == MAIN_SCHEMA) {
            return Err(SqliteLeaseError::MissingDefaultSchema(MAIN_SCHEMA.to_owned()));
        }

        let inner = PoolInner {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            max: AtomicUsize::new(config.effective_max()),
            flags: config.effective_flags(),
            cur: AtomicUsize::new(0),
            idle: Mutex::new(Vec::new()),
            sink,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            next_lease: AtomicU64::new(1),
            config,
        };
        let first = inner.new_conn()?;
        inner.idle().push(first);

        let pool = Self {
            inner: Arc::new(inner),
        };
        tracing::info!(%pool, "opened sqlite pool");
        Ok(pool)
    }

    /// Open a pool with default settings whose `main` schema is the store at
    /// `path` (empty for in-memory).
    ///
    /// # Errors
    /// See [`Pool::open`].
    pub fn new(path: impl Into<std::path::PathBuf>, sink: Option<ErrorSink>) -> Result<Self, SqliteLeaseError> {
        PoolConfig::builder().schema(MAIN_SCHEMA, path).open(sink)
    }

    /// Lease a connection.
    ///
    /// Returns `None` when the pool is closed (`PoolClosed` is sent to the
    /// sink), when it is at capacity (a `PoolExhausted` error is sent to the
    /// sink) or when a new connection cannot be built (the
    /// build error is sent to the sink). The lease is reclaimed when it is
    /// dropped, when `cancel` fires, or when the pool shuts down.
    pub fn get(&self, cancel: &CancellationToken) -> Option<PooledConnection> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            tracing::warn!("lease requested from a closed pool");
            inner.report(SqliteLeaseError::PoolClosed);
            return None;
        }
        let granted = inner
            .cur
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                (cur < inner.max.load(Ordering::SeqCst)).then_some(cur + 1)
            });
        if granted.is_err() {
            let max = inner.max.load(Ordering::SeqCst);
            tracing::warn!(max, "connection pool exhausted");
            inner.report(SqliteLeaseError::PoolExhausted { max });
            return None;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            inner.cur.fetch_sub(1, Ordering::SeqCst);
            inner.report(SqliteLeaseError::ConfigError(
                "Pool::get must be called from within a tokio runtime".into(),
            ));
            return None;
        };

        let reused = inner.idle().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => match inner.new_conn() {
                Ok(conn) => conn,
                Err(err) => {
                    inner.cur.fetch_sub(1, Ordering::SeqCst);
                    tracing::error!(%err, "failed to open pooled connection");
                    inner.report(err);
                    return None;
                }
            },
        };

        let id = inner.next_lease.fetch_add(1, Ordering::Relaxed);
        let slot: SharedConn = Arc::new(tokio::sync::Mutex::new(Some(conn)));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let waiter = Arc::clone(inner);
        let waiter_slot = Arc::clone(&slot);
        let cancel = cancel.clone();
        let shutdown = inner.shutdown.clone();
        inner.tracker.spawn_on(
            async move {
                let reason = tokio::select! {
                    () = cancel.cancelled() => "cancelled",
                    _ = release_rx => "released",
                    () = shutdown.cancelled() => "shutdown",
                };
                // Waits for any closure still running on the connection.
                let conn = waiter_slot.lock().await.take();
                waiter.reclaim(id, conn, reason);
            },
            &handle,
        );

        tracing::debug!(lease = id, cur = self.cur(), "leased connection");
        Some(PooledConnection::new(slot, release_tx, id, inner.id))
    }

    /// Give a lease back. Equivalent to dropping it.
    ///
    /// # Panics
    /// Panics if `lease` was handed out by a different pool.
    pub fn put(&self, lease: PooledConnection) {
        assert!(
            lease.pool_id == self.inner.id,
            "lease {} returned to a pool that did not issue it",
            lease.id()
        );
        if lease.is_released() {
            tracing::warn!(lease = lease.id(), "put of an already reclaimed lease");
        }
        drop(lease);
    }

    /// Current lease limit.
    #[must_use]
    pub fn max(&self) -> usize {
        self.inner.max.load(Ordering::SeqCst)
    }

    /// Change the lease limit. Lowering it never revokes outstanding leases;
    /// surplus connections are closed as they come back. Ignored once the
    /// pool is closed.
    pub fn set_max(&self, max: usize) {
        if self.is_closed() {
            tracing::warn!(max, "set_max on a closed pool ignored");
            return;
        }
        let previous = self.inner.max.swap(max, Ordering::SeqCst);
        tracing::debug!(previous, max, "pool limit changed");
    }

    /// Leases currently outstanding.
    #[must_use]
    pub fn cur(&self) -> usize {
        self.inner.cur.load(Ordering::SeqCst)
    }

    /// Connections waiting in the idle store.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.idle().len()
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Shut the pool down.
    ///
    /// Refuses new leases, revokes every outstanding one, waits until each
    /// has been reclaimed (including closures still running on them), then
    /// closes all idle connections.
    ///
    /// # Errors
    /// Returns the close failures of idle connections, folded together.
    pub async fn close(&self) -> Result<(), SqliteLeaseError> {
        self.inner.max.store(0, Ordering::SeqCst);
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;

        let idle = std::mem::take(&mut *self.inner.idle());
        let count = idle.len();
        let errors = idle
            .into_iter()
            .filter_map(|conn| conn.close().err())
            .collect();
        tracing::info!(closed = count, "sqlite pool closed");
        aggregate(errors)
    }
}

impl PoolInner {
    fn idle(&self) -> MutexGuard<'_, Vec<Conn>> {
        match self.idle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn report(&self, err: SqliteLeaseError) {
        match &self.sink {
            Some(sink) => sink.report(err),
            None => tracing::debug!(%err, "no error sink configured"),
        }
    }

    fn new_conn(&self) -> Result<Conn, SqliteLeaseError> {
        let main_path = self
            .config
            .schemas
            .iter()
            .find(|(name, _)| name.trim() == MAIN_SCHEMA)
            .map(|(_, path)| path.clone())
            .ok_or_else(|| SqliteLeaseError::MissingDefaultSchema(MAIN_SCHEMA.to_owned()))?;

        let mut conn = Conn::open(&main_path, self.flags)?;
        if self.config.trace {
            conn.set_trace(true);
        }
        if let Some(timeout) = self.config.busy_timeout() {
            conn.set_busy_timeout(timeout)?;
        }

        let mut errors = Vec::new();
        for (name, path) in &self.config.schemas {
            let name = name.trim();
            if name == MAIN_SCHEMA {
                continue;
            }
            if let Err(err) = conn.attach(name, path, self.config.create, self.flags) {
                errors.push(err);
            }
        }
        aggregate(errors)?;

        if let Some(authorizer) = &self.config.authorizer {
            conn.set_authorizer(Some(Arc::clone(authorizer)), self.sink.clone());
        }
        tracing::debug!(path = %main_path.display(), "built pooled connection");
        Ok(conn)
    }

    fn reclaim(&self, lease: u64, conn: Option<Conn>, reason: &'static str) {
        let remaining = self.cur.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        let max = self.max.load(Ordering::SeqCst);
        let Some(conn) = conn else {
            tracing::error!(lease, reason, "reclaimed lease had no connection");
            return;
        };
        if remaining < max && !self.shutdown.is_cancelled() {
            self.idle().push(conn);
            tracing::debug!(lease, reason, remaining, "connection returned to idle store");
        } else {
            tracing::debug!(lease, reason, remaining, max, "closing surplus connection");
            if let Err(err) = conn.close() {
                self.report(err);
            }
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<pool cur={} max={} flags={:?}",
            self.cur(),
            self.max(),
            self.inner.flags
        )?;
        for (name, path) in &self.inner.config.schemas {
            let path = if path.as_os_str().is_empty() {
                MEMORY.into()
            } else {
                path.to_string_lossy()
            };
            write!(f, " {}={path:?}", name.trim())?;
        }
        f.write_str(">")
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("cur", &self.cur())
            .field("max", &self.max())
            .field("idle", &self.idle_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_main_schema_is_rejected() {
        let config = PoolConfig {
            schemas: [("logs".to_owned(), std::path::PathBuf::new())].into(),
            ..PoolConfig::default()
        };
        let err = Pool::open(config, None).unwrap_err();
        assert!(matches!(err, SqliteLeaseError::MissingDefaultSchema(_)));
    }

    #[test]
    fn open_starts_with_one_idle_connection() {
        let pool = Pool::new("", None).unwrap();
        assert_eq!(pool.cur(), 0);
        assert_eq!(pool.max(), DEFAULT_MAX);
        assert_eq!(pool.idle_count(), 1);
        let shown = pool.to_string();
        assert!(shown.starts_with("<pool cur=0 max=5 flags="), "{shown}");
        assert!(shown.ends_with(" main=\":memory:\">"), "{shown}");
    }

    #[test]
    fn get_outside_runtime_reports() {
        let (sink, mut rx) = ErrorSink::channel(4);
        let pool = Pool::new("", Some(sink)).unwrap();
        assert!(pool.get(&CancellationToken::new()).is_none());
        assert_eq!(pool.cur(), 0);
        assert!(matches!(rx.try_recv(), Ok(SqliteLeaseError::ConfigError(_))));
    }
}
