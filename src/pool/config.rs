use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::OpenFlags;
use serde::Deserialize;

use super::{ErrorSink, Pool};
use crate::error::SqliteLeaseError;
use crate::sqlite::{Authorizer, default_open_flags};

/// Name of the schema every connection opens first.
pub const MAIN_SCHEMA: &str = "main";

/// Pool size used when `max` is left at zero.
pub const DEFAULT_MAX: usize = 5;

/// Options for a [`Pool`].
///
/// Deserializable from JSON; `flags` and `authorizer` can only be set in code.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum simultaneous leases; `0` selects [`DEFAULT_MAX`].
    pub max: usize,
    /// Schema name to store path. An empty path is an in-memory store.
    /// Must contain [`MAIN_SCHEMA`].
    #[serde(rename = "databases")]
    pub schemas: BTreeMap<String, PathBuf>,
    /// Log each statement under the `sqlite_lease::trace` target.
    pub trace: bool,
    /// Create missing store files.
    pub create: bool,
    pub busy_timeout_ms: Option<u64>,
    #[serde(skip)]
    pub flags: Option<OpenFlags>,
    #[serde(skip)]
    pub authorizer: Option<Arc<dyn Authorizer>>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max: DEFAULT_MAX,
            schemas: BTreeMap::from([(MAIN_SCHEMA.to_owned(), PathBuf::new())]),
            trace: false,
            create: true,
            busy_timeout_ms: None,
            flags: None,
            authorizer: None,
        }
    }
}

impl PoolConfig {
    /// Parse a JSON document such as
    /// `{"max": 2, "databases": {"main": "app.db", "logs": ""}}`.
    ///
    /// # Errors
    /// Returns `ConfigError` when the document does not match.
    pub fn from_json(json: &str) -> Result<Self, SqliteLeaseError> {
        serde_json::from_str(json)
            .map_err(|e| SqliteLeaseError::ConfigError(format!("invalid pool config: {e}")))
    }

    #[must_use]
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// `max` with zero mapped to the default.
    #[must_use]
    pub fn effective_max(&self) -> usize {
        if self.max == 0 { DEFAULT_MAX } else { self.max }
    }

    /// Configured flags (or the defaults) with `SQLITE_OPEN_CREATE` following `create`.
    #[must_use]
    pub fn effective_flags(&self) -> OpenFlags {
        let mut flags = self.flags.unwrap_or_else(default_open_flags);
        flags.set(OpenFlags::SQLITE_OPEN_CREATE, self.create);
        flags
    }

    pub(crate) fn busy_timeout(&self) -> Option<Duration> {
        self.busy_timeout_ms.map(Duration::from_millis)
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("max", &self.max)
            .field("schemas", &self.schemas)
            .field("trace", &self.trace)
            .field("create", &self.create)
            .field("busy_timeout_ms", &self.busy_timeout_ms)
            .field("flags", &self.flags)
            .field("authorizer", &self.authorizer.is_some())
            .finish()
    }
}

/// Fluent builder for [`PoolConfig`].
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max(mut self, max: usize) -> Self {
        self.config.max = max;
        self
    }

    /// Map `name` to the store at `path` (`main` replaces the default store).
    #[must_use]
    pub fn schema(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.config.schemas.insert(name.into(), path.into());
        self
    }

    #[must_use]
    pub fn memory_schema(self, name: impl Into<String>) -> Self {
        self.schema(name, PathBuf::new())
    }

    #[must_use]
    pub fn create(mut self, create: bool) -> Self {
        self.config.create = create;
        self
    }

    #[must_use]
    pub fn trace(mut self, trace: bool) -> Self {
        self.config.trace = trace;
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.config.flags = Some(flags);
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.config.busy_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.config.authorizer = Some(authorizer);
        self
    }

    #[must_use]
    pub fn finish(self) -> PoolConfig {
        self.config
    }

    /// Open a [`Pool`] from the built configuration.
    ///
    /// # Errors
    /// See [`Pool::open`].
    pub fn open(self, sink: Option<ErrorSink>) -> Result<Pool, SqliteLeaseError> {
        Pool::open(self.finish(), sink)
    }
}
