use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, oneshot};

use crate::error::SqliteLeaseError;
use crate::results::ResultSet;
use crate::sqlite::Conn;
use crate::types::RowValues;

/// Slot shared between a lease and the task that reclaims it. The reclaimer
/// takes the connection out, after which every use of the lease fails.
pub(crate) type SharedConn = Arc<Mutex<Option<Conn>>>;

/// A connection leased from a [`Pool`](super::Pool).
///
/// Dropping the lease (or passing it to [`Pool::put`](super::Pool::put))
/// returns the connection. Once the lease has been reclaimed, through release,
/// caller cancellation, or pool shutdown, operations fail with
/// [`SqliteLeaseError::LeaseReleased`].
pub struct PooledConnection {
    slot: SharedConn,
    release: Option<oneshot::Sender<()>>,
    id: u64,
    pub(crate) pool_id: u64,
}

impl PooledConnection {
    pub(crate) fn new(slot: SharedConn, release: oneshot::Sender<()>, id: u64, pool_id: u64) -> Self {
        Self {
            slot,
            release: Some(release),
            id,
            pool_id,
        }
    }

    /// Identifier of this lease, unique within its pool.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run synchronous work against the leased connection on a blocking
    /// thread.
    ///
    /// The closure has the connection to itself for its whole run; a
    /// cancellation that arrives meanwhile takes effect when it returns.
    ///
    /// # Errors
    /// Returns `LeaseReleased` if the lease was already reclaimed, otherwise
    /// whatever `func` returns.
    pub async fn with_connection<F, R>(&self, func: F) -> Result<R, SqliteLeaseError>
    where
        F: FnOnce(&mut Conn) -> Result<R, SqliteLeaseError> + Send + 'static,
        R: Send + 'static,
    {
        run_blocking(Arc::clone(&self.slot), func).await
    }

    /// Run every statement in `sql`, discarding rows.
    ///
    /// # Errors
    /// Returns `LeaseReleased` or the engine error.
    pub async fn execute_batch(&self, sql: impl Into<String>) -> Result<(), SqliteLeaseError> {
        let sql = sql.into();
        self.with_connection(move |conn| conn.execute_batch(&sql))
            .await
    }

    /// Run the statements in `sql` in order and return the rows of the last
    /// one. `params` are bound to the last statement; earlier ones run with
    /// every parameter NULL.
    ///
    /// # Errors
    /// Returns `LeaseReleased`, a parameter error, or the engine error.
    pub async fn query(
        &self,
        sql: impl Into<String>,
        params: Vec<RowValues>,
    ) -> Result<ResultSet, SqliteLeaseError> {
        let sql = sql.into();
        self.with_connection(move |conn| {
            let mut set = conn.prepare(&sql)?;
            let outcome = collect_last(&mut set, &params);
            let closed = set.close();
            let result_set = outcome?;
            closed?;
            Ok(result_set)
        })
        .await
    }

    /// Whether the lease has been given back or revoked.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.release.as_ref().is_none_or(oneshot::Sender::is_closed)
            || self.slot.try_lock().is_ok_and(|guard| guard.is_none())
    }

    pub(crate) fn release(&mut self) {
        if let Some(tx) = self.release.take() {
            if tx.send(()).is_err() {
                tracing::debug!(lease = self.id, "lease already reclaimed");
            }
        }
    }
}

fn collect_last(
    set: &mut crate::sqlite::StatementSet<'_>,
    params: &[RowValues],
) -> Result<ResultSet, SqliteLeaseError> {
    let mut last = ResultSet::default();
    let final_index = set.len().saturating_sub(1);
    for index in 0..set.len() {
        let bound = if index == final_index { params } else { &[] };
        if let Some(cursor) = set.exec(index, bound)? {
            last = cursor.collect_all()?;
        }
    }
    Ok(last)
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}

pub(crate) async fn run_blocking<F, R>(slot: SharedConn, func: F) -> Result<R, SqliteLeaseError>
where
    F: FnOnce(&mut Conn) -> Result<R, SqliteLeaseError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = slot.blocking_lock();
        let conn = guard.as_mut().ok_or(SqliteLeaseError::LeaseReleased)?;
        func(conn)
    })
    .await
    .map_err(|e| SqliteLeaseError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}
