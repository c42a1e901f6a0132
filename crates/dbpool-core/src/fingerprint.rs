//! Settings fingerprint used to detect configuration drift.

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use dbpool_driver::ConnectionParams;

use crate::config::PoolConfig;
use crate::error::Result;
use crate::settings::DatabaseSettings;

/// Comparable snapshot of the settings a pool was built from.
///
/// Two fingerprints are equal exactly when the connection parameters and the
/// pool configuration they were computed from are equal.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    params: ConnectionParams,
    config: PoolConfig,
    digest: u64,
}

impl Fingerprint {
    /// Snapshot resolved parameters and configuration.
    #[must_use]
    pub fn new(params: ConnectionParams, config: PoolConfig) -> Self {
        let mut hasher = DefaultHasher::new();
        params.hash(&mut hasher);
        config.hash(&mut hasher);
        let digest = hasher.finish();

        Self {
            params,
            config,
            digest,
        }
    }

    /// Resolve `settings` and snapshot the result.
    pub fn of(settings: &DatabaseSettings) -> Result<Self> {
        let (params, config) = settings.resolve()?;
        Ok(Self::new(params, config))
    }

    /// Connection parameters forwarded to the physical pool.
    #[must_use]
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Short digest for logs. Only stable within one process.
    #[must_use]
    pub fn digest(&self) -> u64 {
        self.digest
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.digest)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprint")
            .field("digest", &format_args!("{self}"))
            .field("params", &self.params)
            .field("config", &self.config)
            .finish()
    }
}
