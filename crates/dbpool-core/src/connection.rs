//! Borrowed connection proxy.
//!
//! A [`PooledConnection`] stands in for a physical connection. Every
//! [`Connection`] method is forwarded to the connection it wraps, except
//! [`close`](Connection::close), which hands the connection back to the pool
//! it came from.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dbpool_driver::{
    Connection, Error, IsolationLevel, PhysicalPool, QueryResult, TransactionStatus, Value,
};

use crate::descriptor::PoolDescriptor;
use crate::error::{PoolError, Result};
use crate::lifecycle::ConnectionState;

/// A connection borrowed from a pool.
///
/// Calling `close()` returns the physical connection to its pool; calling it
/// again does nothing. Any other call after `close()` fails with
/// [`Error::ConnectionReleased`].
///
/// The handle only keeps a weak reference to its pool. If the pool was
/// retired and dropped while the connection was out, `close()` closes the
/// physical connection instead.
///
/// Dropping an active handle releases the connection too, discarding it if a
/// transaction was left open.
pub struct PooledConnection {
    alias: String,
    pool: Option<Weak<dyn PhysicalPool>>,
    underlying: Option<Box<dyn Connection>>,
}

impl PooledConnection {
    /// Borrow a connection from `descriptor`'s pool.
    ///
    /// With a validation policy, each borrowed connection is probed first.
    /// A connection failing the probe is discarded and another one borrowed,
    /// up to the policy's `max_attempts`; after that the call fails with
    /// [`PoolError::Exhausted`]. Errors from the pool itself are returned
    /// unchanged.
    pub async fn acquire(descriptor: &PoolDescriptor) -> Result<Self> {
        let pool = descriptor.physical_pool();

        let Some(policy) = descriptor.validation() else {
            let conn = match pool.acquire().await {
                Ok(conn) => conn,
                Err(e) => {
                    descriptor.record_checkout(false);
                    return Err(e.into());
                }
            };
            descriptor.record_checkout(true);
            return Ok(Self::new(descriptor.alias(), pool, conn));
        };

        for attempt in 1..=policy.max_attempts {
            let conn = match pool.acquire().await {
                Ok(conn) => conn,
                Err(e) => {
                    descriptor.record_checkout(false);
                    return Err(e.into());
                }
            };
            let mut proxy = Self::new(descriptor.alias(), pool, conn);

            match policy.probe(&mut proxy).await {
                Ok(()) => {
                    descriptor.record_validation(true);
                    descriptor.record_checkout(true);
                    return Ok(proxy);
                }
                Err(e) => {
                    tracing::warn!(
                        alias = %descriptor.alias(),
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "connection failed validation, discarding"
                    );
                    descriptor.record_validation(false);
                    proxy.discard();
                }
            }
        }

        tracing::error!(
            alias = %descriptor.alias(),
            attempts = policy.max_attempts,
            "no connection passed validation"
        );
        descriptor.record_checkout(false);
        Err(PoolError::Exhausted {
            alias: descriptor.alias().to_string(),
            attempts: policy.max_attempts,
        })
    }

    fn new(alias: &str, pool: &Arc<dyn PhysicalPool>, conn: Box<dyn Connection>) -> Self {
        tracing::debug!(
            alias = %alias,
            backend_pid = conn.backend_pid().ok(),
            "checking out connection"
        );
        Self {
            alias: alias.to_string(),
            pool: Some(Arc::downgrade(pool)),
            underlying: Some(conn),
        }
    }

    /// Alias of the pool this connection came from.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Lifecycle state of the handle.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        if self.underlying.is_some() {
            ConnectionState::Active
        } else {
            ConnectionState::Released
        }
    }

    /// Whether the connection went back to its pool.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.state() == ConnectionState::Released
    }

    /// Return the connection to its pool marked as not reusable.
    ///
    /// No-op once released.
    pub fn discard(&mut self) {
        if let Some(conn) = self.underlying.take() {
            self.hand_back(conn, true);
        }
    }

    fn hand_back(&mut self, conn: Box<dyn Connection>, discard: bool) {
        let pool = self.pool.take().and_then(|weak| weak.upgrade());
        match pool {
            Some(pool) => {
                tracing::debug!(
                    alias = %self.alias,
                    backend_pid = conn.backend_pid().ok(),
                    discard,
                    "returning connection to pool"
                );
                pool.release(conn, discard);
            }
            None => {
                tracing::debug!(
                    alias = %self.alias,
                    backend_pid = conn.backend_pid().ok(),
                    "pool is gone, closing connection"
                );
                drop(conn);
            }
        }
    }

    fn inner(&self) -> dbpool_driver::Result<&dyn Connection> {
        self.underlying.as_deref().ok_or(Error::ConnectionReleased)
    }

    fn inner_mut(&mut self) -> dbpool_driver::Result<&mut dyn Connection> {
        self.underlying
            .as_deref_mut()
            .ok_or(Error::ConnectionReleased)
    }
}

#[async_trait]
impl Connection for PooledConnection {
    fn backend_pid(&self) -> dbpool_driver::Result<u32> {
        self.inner()?.backend_pid()
    }

    fn is_closed(&self) -> bool {
        self.underlying.as_ref().is_none_or(|conn| conn.is_closed())
    }

    fn autocommit(&self) -> dbpool_driver::Result<bool> {
        self.inner()?.autocommit()
    }

    fn transaction_status(&self) -> dbpool_driver::Result<TransactionStatus> {
        self.inner()?.transaction_status()
    }

    fn parameter_status(&self, name: &str) -> dbpool_driver::Result<Option<String>> {
        self.inner()?.parameter_status(name)
    }

    fn server_version(&self) -> dbpool_driver::Result<u32> {
        self.inner()?.server_version()
    }

    async fn set_client_encoding(&mut self, encoding: &str) -> dbpool_driver::Result<()> {
        self.inner_mut()?.set_client_encoding(encoding).await
    }

    async fn set_autocommit(&mut self, enabled: bool) -> dbpool_driver::Result<()> {
        self.inner_mut()?.set_autocommit(enabled).await
    }

    async fn set_isolation_level(&mut self, level: IsolationLevel) -> dbpool_driver::Result<()> {
        self.inner_mut()?.set_isolation_level(level).await
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> dbpool_driver::Result<QueryResult> {
        self.inner_mut()?.execute(sql, params).await
    }

    async fn commit(&mut self) -> dbpool_driver::Result<()> {
        self.inner_mut()?.commit().await
    }

    async fn rollback(&mut self) -> dbpool_driver::Result<()> {
        self.inner_mut()?.rollback().await
    }

    /// Return the connection to its pool instead of closing it.
    ///
    /// A transaction left open is rolled back first; a connection that cannot
    /// be rolled back, or whose state is unknown, is discarded.
    async fn close(&mut self) -> dbpool_driver::Result<()> {
        let Some(mut conn) = self.underlying.take() else {
            return Ok(());
        };

        let discard = match conn.transaction_status() {
            Ok(status) if status.in_transaction() => match conn.rollback().await {
                Ok(()) => false,
                Err(e) => {
                    tracing::debug!(alias = %self.alias, error = %e, "rollback on release failed");
                    true
                }
            },
            Ok(TransactionStatus::Unknown) | Err(_) => true,
            Ok(_) => conn.is_closed(),
        };

        self.hand_back(conn, discard);
        Ok(())
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.underlying.take() {
            let discard = conn.is_closed()
                || !matches!(conn.transaction_status(), Ok(TransactionStatus::Idle));
            self.hand_back(conn, discard);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("alias", &self.alias)
            .field("state", &self.state())
            .field(
                "backend_pid",
                &self.underlying.as_ref().and_then(|c| c.backend_pid().ok()),
            )
            .finish()
    }
}
