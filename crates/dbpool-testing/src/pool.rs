//! Mock physical pool and driver.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dbpool_driver::{
    Connection, ConnectionParams, Error, PhysicalPool, PoolFactory, PoolStatus, Result,
};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::connection::MockConnection;
use crate::server::MockServer;

/// Pool factory backed by a [`MockServer`].
#[derive(Debug, Clone)]
pub struct MockDriver {
    server: Arc<MockServer>,
    acquire_timeout: Option<Duration>,
}

impl MockDriver {
    /// Create a driver for `server`.
    #[must_use]
    pub fn new(server: Arc<MockServer>) -> Self {
        Self {
            server,
            acquire_timeout: None,
        }
    }

    /// Fail acquires that wait longer than `timeout`.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// The server this driver talks to.
    #[must_use]
    pub fn server(&self) -> &Arc<MockServer> {
        &self.server
    }
}

#[async_trait]
impl PoolFactory for MockDriver {
    async fn create_pool(
        &self,
        params: &ConnectionParams,
        min_size: u32,
        max_size: u32,
    ) -> Result<Arc<dyn PhysicalPool>> {
        if params.database().is_none_or(str::is_empty) {
            return Err(Error::Config("no database name given".into()));
        }
        params.port()?;
        if min_size > max_size || max_size == 0 {
            return Err(Error::Config(format!(
                "invalid pool size: min {min_size}, max {max_size}"
            )));
        }

        if let Some(delay) = self.server.pool_delay() {
            tokio::time::sleep(delay).await;
        }

        self.server.record_pool(params, min_size, max_size);
        let pool = MockPool::new(
            Arc::clone(&self.server),
            min_size,
            max_size,
            self.acquire_timeout,
        );
        Ok(Arc::new(pool))
    }
}

/// Bounded pool of [`MockConnection`]s.
///
/// Opens `min_size` sessions up front, never has more than `max_size`
/// borrowed, keeps at most `min_size` idle sessions on release and closes
/// the rest.
pub struct MockPool {
    server: Arc<MockServer>,
    min_size: u32,
    max_size: u32,
    acquire_timeout: Option<Duration>,
    idle: Mutex<VecDeque<Box<dyn Connection>>>,
    slots: Semaphore,
    in_use: AtomicU32,
    closed: AtomicBool,
}

impl MockPool {
    /// Create a pool and open its initial sessions.
    #[must_use]
    pub fn new(
        server: Arc<MockServer>,
        min_size: u32,
        max_size: u32,
        acquire_timeout: Option<Duration>,
    ) -> Self {
        let idle: VecDeque<Box<dyn Connection>> = (0..min_size)
            .map(|_| Box::new(MockConnection::open(Arc::clone(&server))) as Box<dyn Connection>)
            .collect();

        Self {
            server,
            min_size,
            max_size,
            acquire_timeout,
            idle: Mutex::new(idle),
            slots: Semaphore::new(max_size as usize),
            in_use: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        }
    }

    async fn wait_for_slot(&self) -> Result<()> {
        let permit = match self.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.slots.acquire())
                .await
                .map_err(|_| Error::Timeout(timeout))?,
            None => self.slots.acquire().await,
        };
        permit.map_err(|_| Error::PoolClosed)?.forget();
        Ok(())
    }
}

#[async_trait]
impl PhysicalPool for MockPool {
    async fn acquire(&self) -> Result<Box<dyn Connection>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::PoolClosed);
        }
        self.wait_for_slot().await?;

        let conn = self.idle.lock().pop_front();
        let conn = match conn {
            Some(conn) => conn,
            None => Box::new(MockConnection::open(Arc::clone(&self.server))),
        };
        self.in_use.fetch_add(1, Ordering::SeqCst);
        Ok(conn)
    }

    fn release(&self, conn: Box<dyn Connection>, discard: bool) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);

        let keep = !discard && !conn.is_closed() && !self.closed.load(Ordering::Acquire);
        {
            let mut idle = self.idle.lock();
            if keep && (idle.len() as u32) < self.min_size {
                idle.push_back(conn);
            } else {
                drop(conn);
            }
        }
        self.slots.add_permits(1);
    }

    fn close_all(&self) {
        self.closed.store(true, Ordering::Release);
        self.slots.close();
        self.idle.lock().clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            available: self.idle.lock().len() as u32,
            in_use: self.in_use.load(Ordering::SeqCst),
            max: self.max_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectionParams {
        ConnectionParams::new().with("database", "app")
    }

    #[tokio::test]
    async fn test_pool_opens_min_sessions() {
        let server = MockServer::new();
        let pool = server.driver().create_pool(&params(), 2, 4).await.unwrap();

        assert_eq!(server.pools_created(), 1);
        assert_eq!(server.connections_opened(), 2);
        assert_eq!(
            pool.status(),
            PoolStatus {
                available: 2,
                in_use: 0,
                max: 4
            }
        );
    }

    #[tokio::test]
    async fn test_missing_database_is_rejected() {
        let server = MockServer::new();
        let result = server
            .driver()
            .create_pool(&ConnectionParams::new(), 1, 1)
            .await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_release_reuses_and_discard_closes() {
        let server = MockServer::new();
        let pool = server.driver().create_pool(&params(), 1, 1).await.unwrap();

        let conn = pool.acquire().await.unwrap();
        let pid = conn.backend_pid().unwrap();
        pool.release(conn, false);

        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.backend_pid().unwrap(), pid);
        pool.release(conn, true);
        assert_eq!(server.connections_closed(), 1);

        let conn = pool.acquire().await.unwrap();
        assert_ne!(conn.backend_pid().unwrap(), pid);
        pool.release(conn, false);
    }

    #[tokio::test]
    async fn test_acquire_timeout() {
        let server = MockServer::new();
        let pool = server
            .driver()
            .acquire_timeout(Duration::from_millis(20))
            .create_pool(&params(), 1, 1)
            .await
            .unwrap();

        let held = pool.acquire().await.unwrap();
        assert!(matches!(pool.acquire().await, Err(Error::Timeout(_))));
        pool.release(held, false);
    }

    #[tokio::test]
    async fn test_close_all_drops_idle_and_rejects_acquire() {
        let server = MockServer::new();
        let pool = server.driver().create_pool(&params(), 2, 2).await.unwrap();

        let held = pool.acquire().await.unwrap();
        pool.close_all();
        assert!(pool.is_closed());
        assert_eq!(server.live_connections(), 1);
        assert!(matches!(pool.acquire().await, Err(Error::PoolClosed)));

        pool.release(held, false);
        assert_eq!(server.live_connections(), 0);
    }
}
