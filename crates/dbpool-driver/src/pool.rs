//! Physical pool capability.
//!
//! A physical pool owns a bounded set of physical connections. The registry
//! treats it as a black box: it only acquires, releases and retires.

use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::Connection;
use crate::error::Result;
use crate::params::ConnectionParams;

/// A bounded set of physical connections.
///
/// Implementations provide their own internal synchronization; callers never
/// wrap a pool in an extra lock.
#[async_trait]
pub trait PhysicalPool: Send + Sync + 'static {
    /// Borrow a connection.
    ///
    /// Suspends while the pool is at capacity until a connection is released
    /// or the pool's own timeout policy fails the request.
    async fn acquire(&self) -> Result<Box<dyn Connection>>;

    /// Return a borrowed connection.
    ///
    /// With `discard` set the connection is closed instead of being kept for
    /// reuse, and its slot becomes free.
    fn release(&self, conn: Box<dyn Connection>, discard: bool);

    /// Close every idle connection and stop pooling.
    ///
    /// Connections still borrowed stay usable; they are closed when released.
    fn close_all(&self);

    /// Whether [`close_all`](PhysicalPool::close_all) has been called.
    fn is_closed(&self) -> bool;

    /// Current occupancy.
    fn status(&self) -> PoolStatus;
}

/// Builds physical pools.
#[async_trait]
pub trait PoolFactory: Send + Sync + 'static {
    /// Create a pool holding between `min_size` and `max_size` connections.
    async fn create_pool(
        &self,
        params: &ConnectionParams,
        min_size: u32,
        max_size: u32,
    ) -> Result<Arc<dyn PhysicalPool>>;
}

#[async_trait]
impl<T: PoolFactory> PoolFactory for Arc<T> {
    async fn create_pool(
        &self,
        params: &ConnectionParams,
        min_size: u32,
        max_size: u32,
    ) -> Result<Arc<dyn PhysicalPool>> {
        (**self).create_pool(params, min_size, max_size).await
    }
}

/// Status information about a physical pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently borrowed.
    pub in_use: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

impl PoolStatus {
    /// Total number of open connections.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.available + self.in_use
    }

    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (f64::from(self.in_use) / f64::from(self.max)) * 100.0
    }

    /// Check if every slot is borrowed.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.in_use >= self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_status_utilization() {
        let status = PoolStatus {
            available: 5,
            in_use: 5,
            max: 20,
        };
        assert_eq!(status.total(), 10);
        assert!((status.utilization() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pool_status_at_capacity() {
        let full = PoolStatus {
            available: 0,
            in_use: 10,
            max: 10,
        };
        assert!(full.is_at_capacity());

        let idle = PoolStatus {
            available: 10,
            in_use: 0,
            max: 10,
        };
        assert!(!idle.is_at_capacity());
        assert_eq!(idle.utilization(), 0.0);
    }
}
