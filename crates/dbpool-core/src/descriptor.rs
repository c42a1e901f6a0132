//! Pool descriptor: one alias's configuration snapshot plus its physical pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dbpool_driver::{ConnectionParams, PhysicalPool, PoolStatus};
use parking_lot::Mutex;

use crate::config::PoolConfig;
use crate::connection::PooledConnection;
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::lifecycle::ValidationPolicy;

/// The pool serving one alias.
///
/// Immutable apart from its metrics and retirement flag. The registry
/// replaces the whole descriptor when the alias's settings change.
pub struct PoolDescriptor {
    alias: String,
    fingerprint: Fingerprint,
    pool: Arc<dyn PhysicalPool>,
    created_at: Instant,
    retired: AtomicBool,
    metrics: Mutex<PoolMetricsInner>,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    checkouts_successful: u64,
    checkouts_failed: u64,
    validations_performed: u64,
    validations_failed: u64,
    connections_discarded: u64,
}

impl PoolDescriptor {
    pub(crate) fn new(
        alias: impl Into<String>,
        fingerprint: Fingerprint,
        pool: Arc<dyn PhysicalPool>,
    ) -> Self {
        Self {
            alias: alias.into(),
            fingerprint,
            pool,
            created_at: Instant::now(),
            retired: AtomicBool::new(false),
            metrics: Mutex::new(PoolMetricsInner::default()),
        }
    }

    /// Borrow a connection, validating it first when test-on-borrow is on.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        PooledConnection::acquire(self).await
    }

    /// Alias this pool serves.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Settings snapshot the pool was built from.
    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Connection parameters forwarded to the driver.
    #[must_use]
    pub fn params(&self) -> &ConnectionParams {
        self.fingerprint.params()
    }

    /// Pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        self.fingerprint.config()
    }

    /// Test-on-borrow policy, if enabled.
    #[must_use]
    pub fn validation(&self) -> Option<&ValidationPolicy> {
        self.config().validation.as_ref()
    }

    /// The physical pool.
    #[must_use]
    pub fn physical_pool(&self) -> &Arc<dyn PhysicalPool> {
        &self.pool
    }

    /// Current occupancy of the physical pool.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Whether a newer descriptor replaced this one.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.metrics.lock();
        PoolMetrics {
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            validations_performed: inner.validations_performed,
            validations_failed: inner.validations_failed,
            connections_discarded: inner.connections_discarded,
            uptime: self.created_at.elapsed(),
        }
    }

    /// Close idle connections and stop pooling.
    ///
    /// Connections still borrowed keep working; they are closed when their
    /// holders release them.
    pub(crate) fn retire(&self) {
        if self.retired.swap(true, Ordering::AcqRel) {
            return;
        }
        let status = self.pool.status();
        self.pool.close_all();
        tracing::info!(
            alias = %self.alias,
            fingerprint = %self.fingerprint,
            outstanding = status.in_use,
            "connection pool retired"
        );
    }

    pub(crate) fn record_checkout(&self, success: bool) {
        let mut inner = self.metrics.lock();
        if success {
            inner.checkouts_successful += 1;
        } else {
            inner.checkouts_failed += 1;
        }
    }

    pub(crate) fn record_validation(&self, passed: bool) {
        let mut inner = self.metrics.lock();
        inner.validations_performed += 1;
        if !passed {
            inner.validations_failed += 1;
            inner.connections_discarded += 1;
        }
    }
}

impl std::fmt::Debug for PoolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolDescriptor")
            .field("alias", &self.alias)
            .field("fingerprint", &format_args!("{}", self.fingerprint))
            .field("min", &self.config().min_connections)
            .field("max", &self.config().max_connections)
            .field("retired", &self.is_retired())
            .finish()
    }
}

/// Metrics collected from one pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Successful checkouts.
    pub checkouts_successful: u64,
    /// Failed checkouts (driver errors, exhausted validation).
    pub checkouts_failed: u64,
    /// Validation probes run.
    pub validations_performed: u64,
    /// Validation probes that failed.
    pub validations_failed: u64,
    /// Connections discarded instead of returned for reuse.
    pub connections_discarded: u64,
    /// Time since the pool was created.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }

    /// Calculate validation success rate (0.0 to 1.0).
    #[must_use]
    pub fn validation_success_rate(&self) -> f64 {
        if self.validations_performed == 0 {
            return 1.0;
        }
        let successful = self.validations_performed - self.validations_failed;
        successful as f64 / self.validations_performed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_metrics_success_rates() {
        let metrics = PoolMetrics {
            checkouts_successful: 90,
            checkouts_failed: 10,
            validations_performed: 100,
            validations_failed: 5,
            connections_discarded: 5,
            uptime: Duration::from_secs(3600),
        };

        assert!((metrics.checkout_success_rate() - 0.9).abs() < f64::EPSILON);
        assert!((metrics.validation_success_rate() - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_metrics_report_full_success() {
        let metrics = PoolMetrics {
            checkouts_successful: 0,
            checkouts_failed: 0,
            validations_performed: 0,
            validations_failed: 0,
            connections_discarded: 0,
            uptime: Duration::ZERO,
        };

        assert!((metrics.checkout_success_rate() - 1.0).abs() < f64::EPSILON);
        assert!((metrics.validation_success_rate() - 1.0).abs() < f64::EPSILON);
    }
}
