use std::panic::RefUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::hooks::Authorization;

use super::Conn;
use crate::error::SqliteLeaseError;
use crate::pool::ErrorSink;

pub use rusqlite::hooks::{Action as UpdateAction, AuthAction, AuthContext};

/// Decides whether the engine may perform an action while compiling a
/// statement. Returning an error denies the action.
pub trait Authorizer: Send + Sync + RefUnwindSafe {
    /// # Errors
    /// An error denies the action; it is also forwarded to the pool's error
    /// sink when one is configured.
    fn authorize(&self, ctx: &AuthContext<'_>) -> Result<(), SqliteLeaseError>;
}

impl<F> Authorizer for F
where
    F: Fn(&AuthContext<'_>) -> Result<(), SqliteLeaseError> + Send + Sync + RefUnwindSafe,
{
    fn authorize(&self, ctx: &AuthContext<'_>) -> Result<(), SqliteLeaseError> {
        self(ctx)
    }
}

fn log_profile(sql: &str, elapsed: Duration) {
    tracing::debug!(target: "sqlite_lease::trace", sql, ?elapsed, "statement finished");
}

impl Conn {
    /// Log every statement with its run time at debug level under the
    /// `sqlite_lease::trace` target.
    pub fn set_trace(&mut self, enabled: bool) {
        let hook = enabled.then_some(log_profile as fn(&str, Duration));
        self.conn.profile(hook);
        self.trace = enabled;
    }

    /// Retry for up to `timeout` when another connection holds a lock.
    ///
    /// # Errors
    /// Propagates the engine error.
    pub fn set_busy_timeout(&mut self, timeout: Duration) -> Result<(), SqliteLeaseError> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Install a busy handler; it receives the retry count and returns
    /// whether to keep waiting. `None` removes any handler.
    ///
    /// # Errors
    /// Propagates the engine error.
    pub fn set_busy_handler(
        &mut self,
        handler: Option<fn(i32) -> bool>,
    ) -> Result<(), SqliteLeaseError> {
        self.conn.busy_handler(handler)?;
        Ok(())
    }

    /// Call `handler` roughly every `num_ops` virtual machine instructions.
    /// Returning `true` interrupts the running statement.
    pub fn set_progress_handler<F>(&mut self, num_ops: i32, handler: F)
    where
        F: FnMut() -> bool + Send + RefUnwindSafe + 'static,
    {
        self.conn.progress_handler(num_ops, Some(handler));
    }

    pub fn clear_progress_handler(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }

    /// Called before each commit; returning `true` turns the commit into a
    /// rollback.
    pub fn set_commit_hook<F>(&mut self, hook: Option<F>)
    where
        F: FnMut() -> bool + Send + RefUnwindSafe + 'static,
    {
        self.conn.commit_hook(hook);
    }

    pub fn set_rollback_hook<F>(&mut self, hook: Option<F>)
    where
        F: FnMut() + Send + RefUnwindSafe + 'static,
    {
        self.conn.rollback_hook(hook);
    }

    /// Called for every row inserted, updated, or deleted in a rowid table,
    /// with the schema name, table name, and rowid.
    pub fn set_update_hook<F>(&mut self, hook: Option<F>)
    where
        F: FnMut(UpdateAction, &str, &str, i64) + Send + RefUnwindSafe + 'static,
    {
        self.conn.update_hook(hook);
    }

    /// Install `authorizer`, or remove the current one with `None`.
    ///
    /// Denials are logged and, when `sink` is set, reported there too.
    pub fn set_authorizer(
        &mut self,
        authorizer: Option<Arc<dyn Authorizer>>,
        sink: Option<ErrorSink>,
    ) {
        let Some(authorizer) = authorizer else {
            self.conn
                .authorizer(None::<fn(AuthContext<'_>) -> Authorization>);
            return;
        };
        self.conn.authorizer(Some(move |ctx: AuthContext<'_>| {
            match authorizer.authorize(&ctx) {
                Ok(()) => Authorization::Allow,
                Err(err) => {
                    tracing::debug!(action = ?ctx.action, %err, "authorizer denied action");
                    if let Some(sink) = &sink {
                        sink.report(err);
                    }
                    Authorization::Deny
                }
            }
        }));
    }
}
