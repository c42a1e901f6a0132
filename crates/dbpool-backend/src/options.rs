//! Backend options and server capability flags.

use dbpool_core::{DatabaseSettings, PoolError, Result};
use dbpool_driver::IsolationLevel;

/// First server version with savepoints (8.0).
pub const SAVEPOINTS_MIN_VERSION: u32 = 80_000;

/// First server version with `INSERT ... RETURNING` (8.2).
pub const RETURNING_MIN_VERSION: u32 = 80_200;

/// Session behavior applied to every connection a wrapper sets up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendOptions {
    /// Store and return timestamps in UTC.
    ///
    /// Forces the session timezone to `UTC` and turns naive timestamps
    /// read through a cursor into UTC-aware values.
    pub use_tz: bool,
    /// Isolation level set on each new session.
    pub isolation_level: IsolationLevel,
    /// Run every statement in its own transaction.
    pub autocommit: bool,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            use_tz: false,
            isolation_level: IsolationLevel::ReadCommitted,
            autocommit: false,
        }
    }
}

impl BackendOptions {
    /// Default options with `autocommit` taken from the settings' options.
    pub fn from_settings(settings: &DatabaseSettings) -> Result<Self> {
        Ok(Self {
            autocommit: settings.autocommit()?.unwrap_or(false),
            ..Self::default()
        })
    }

    /// Enable or disable timezone-aware timestamps.
    #[must_use]
    pub fn use_tz(mut self, enabled: bool) -> Self {
        self.use_tz = enabled;
        self
    }

    /// Set the isolation level.
    #[must_use]
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    /// Enable or disable autocommit.
    #[must_use]
    pub fn autocommit(mut self, enabled: bool) -> Self {
        self.autocommit = enabled;
        self
    }
}

/// What the connected server supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    /// Server version as reported by the driver, e.g. `150004` for 15.4.
    pub server_version: u32,
    /// Nested transactions can use savepoints.
    pub uses_savepoints: bool,
    /// Inserts can return the generated id.
    pub can_return_id_from_insert: bool,
}

impl Features {
    /// Derive the flags from the server version.
    ///
    /// Autocommit needs `RETURNING` for reliable inserts, so it is refused on
    /// servers older than 8.2.
    pub fn resolve(server_version: u32, autocommit: bool) -> Result<Self> {
        if autocommit && server_version < RETURNING_MIN_VERSION {
            return Err(PoolError::Configuration(format!(
                "autocommit requires PostgreSQL 8.2 or newer, server reports version {server_version}"
            )));
        }

        Ok(Self {
            server_version,
            uses_savepoints: server_version >= SAVEPOINTS_MIN_VERSION,
            can_return_id_from_insert: autocommit,
        })
    }
}
