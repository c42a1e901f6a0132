//! Per-unit-of-work database session.

use std::sync::Arc;

use dbpool_core::{DatabaseSettings, PoolError, PoolRegistry, PooledConnection, Result};
use dbpool_driver::{Connection, Error};
use tokio::sync::broadcast;

use crate::cursor::Cursor;
use crate::options::{BackendOptions, Features};
use crate::signals::{ConnectionCreated, Signals};
use crate::timezone::{UTC, set_time_zone_sql};

/// Session for one alias, holding at most one borrowed connection.
///
/// The connection is borrowed lazily by [`cursor`](Self::cursor) or
/// [`ensure_connection`](Self::ensure_connection) and returned to the pool by
/// [`close`](Self::close). Dropping the wrapper returns it too.
///
/// A wrapper is owned by one task; share the [`PoolRegistry`] instead.
pub struct DatabaseWrapper {
    alias: String,
    settings: DatabaseSettings,
    registry: Arc<PoolRegistry>,
    options: BackendOptions,
    signals: Signals,
    features: Option<Features>,
    connection: Option<PooledConnection>,
}

impl DatabaseWrapper {
    /// Create a wrapper for `alias`. No connection is borrowed yet.
    pub fn new(
        alias: impl Into<String>,
        settings: DatabaseSettings,
        registry: Arc<PoolRegistry>,
        options: BackendOptions,
    ) -> Self {
        Self {
            alias: alias.into(),
            settings,
            registry,
            options,
            signals: Signals::new(),
            features: None,
            connection: None,
        }
    }

    /// Report [`ConnectionCreated`] events to a shared channel.
    #[must_use]
    pub fn with_signals(mut self, signals: Signals) -> Self {
        self.signals = signals;
        self
    }

    /// Alias this wrapper serves.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Settings used to look up the pool.
    #[must_use]
    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    /// Session options.
    #[must_use]
    pub fn options(&self) -> &BackendOptions {
        &self.options
    }

    /// Server features, known once the first connection was set up.
    #[must_use]
    pub fn features(&self) -> Option<Features> {
        self.features
    }

    /// The channel [`ConnectionCreated`] events are sent to.
    #[must_use]
    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    /// Subscribe to [`ConnectionCreated`] events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionCreated> {
        self.signals.subscribe()
    }

    /// Whether a connection is currently borrowed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The borrowed connection, if any.
    pub fn connection(&mut self) -> Option<&mut PooledConnection> {
        self.connection.as_mut()
    }

    /// Borrow and set up a connection unless one is already held.
    pub async fn ensure_connection(&mut self) -> Result<()> {
        if self.connection.is_none() {
            let conn = self.connect().await?;
            self.connection = Some(conn);
        }
        Ok(())
    }

    /// A cursor over the wrapper's connection, borrowing one first if needed.
    pub async fn cursor(&mut self) -> Result<Cursor<'_>> {
        let conn = match self.connection.take() {
            Some(conn) => conn,
            None => self.connect().await?,
        };
        let conn = self.connection.insert(conn);
        Ok(Cursor::new(conn, self.options.use_tz))
    }

    /// Commit the current transaction. No-op without a connection.
    pub async fn commit(&mut self) -> Result<()> {
        if let Some(conn) = self.connection.as_mut() {
            conn.commit().await?;
        }
        Ok(())
    }

    /// Roll back the current transaction. No-op without a connection.
    pub async fn rollback(&mut self) -> Result<()> {
        if let Some(conn) = self.connection.as_mut() {
            conn.rollback().await?;
        }
        Ok(())
    }

    /// Return the connection to its pool. No-op without a connection.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut conn) = self.connection.take() {
            tracing::debug!(alias = %self.alias, "closing session");
            conn.close().await?;
        }
        Ok(())
    }

    async fn connect(&mut self) -> Result<PooledConnection> {
        let descriptor = self
            .registry
            .get_or_create(&self.alias, &self.settings)
            .await?;
        let mut conn = match descriptor.acquire().await {
            Err(PoolError::Driver(Error::PoolClosed)) if descriptor.is_retired() => {
                // The settings changed while we were waiting; use the new pool.
                tracing::debug!(alias = %self.alias, "pool retired during checkout, retrying");
                let current = self
                    .registry
                    .get_or_create(&self.alias, &self.settings)
                    .await?;
                current.acquire().await?
            }
            result => result?,
        };

        if let Err(e) = self.prepare(&mut conn).await {
            tracing::warn!(alias = %self.alias, error = %e, "session setup failed, discarding connection");
            conn.discard();
            return Err(e);
        }
        Ok(conn)
    }

    async fn prepare(&mut self, conn: &mut PooledConnection) -> Result<()> {
        conn.set_client_encoding("UTF8").await?;

        let tz = if self.options.use_tz {
            Some(UTC)
        } else {
            self.settings.time_zone.as_deref()
        };
        if let Some(tz) = tz {
            let sql = set_time_zone_sql(tz)?;
            let current = conn.parameter_status("TimeZone")?;
            if current.as_deref() != Some(tz) {
                tracing::debug!(alias = %self.alias, from = ?current, to = tz, "setting session timezone");
                // Outside a transaction so the change outlives it.
                conn.set_autocommit(true).await?;
                conn.execute(&sql, &[]).await?;
            }
        }

        conn.set_isolation_level(self.options.isolation_level).await?;
        conn.set_autocommit(self.options.autocommit).await?;

        if self.features.is_none() {
            let version = conn.server_version()?;
            let features = Features::resolve(version, self.options.autocommit)?;
            tracing::debug!(
                alias = %self.alias,
                server_version = version,
                uses_savepoints = features.uses_savepoints,
                can_return_id_from_insert = features.can_return_id_from_insert,
                "server features resolved"
            );
            self.features = Some(features);
        }

        let backend_pid = conn.backend_pid()?;
        tracing::debug!(alias = %self.alias, backend_pid, "session prepared");
        self.signals.connection_created(&self.alias, backend_pid);
        Ok(())
    }
}

impl std::fmt::Debug for DatabaseWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseWrapper")
            .field("alias", &self.alias)
            .field("options", &self.options)
            .field("features", &self.features)
            .field("connection", &self.connection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbpool_driver::{IsolationLevel, TransactionStatus};
    use dbpool_testing::MockServer;

    fn wrapper(server: &Arc<MockServer>, settings: DatabaseSettings) -> DatabaseWrapper {
        let registry = Arc::new(PoolRegistry::new(server.driver()));
        DatabaseWrapper::new("default", settings, registry, BackendOptions::default())
    }

    #[tokio::test]
    async fn test_cursor_borrows_lazily() {
        let server = MockServer::new();
        let mut db = wrapper(&server, DatabaseSettings::new("app"));
        assert!(!db.is_connected());
        assert_eq!(server.pools_created(), 0);

        let mut cursor = db.cursor().await.unwrap();
        assert_eq!(cursor.execute("SELECT 1", &[]).await.unwrap(), 1);
        assert_eq!(cursor.fetch_one().unwrap().get(0), Some(&dbpool_driver::Value::Int(1)));

        assert!(db.is_connected());
        assert!(db.features().unwrap().uses_savepoints);
        db.close().await.unwrap();
        assert!(!db.is_connected());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_setup_statements() {
        let server = MockServer::new();
        let mut db = wrapper(&server, DatabaseSettings::new("app"));

        db.ensure_connection().await.unwrap();
        let pid = db.connection().unwrap().backend_pid().unwrap();

        assert_eq!(
            server.statements_for(pid),
            vec![
                "SET client_encoding TO 'UTF8'",
                IsolationLevel::ReadCommitted.as_sql(),
            ]
        );
    }

    #[tokio::test]
    async fn test_autocommit_on_old_server_is_refused() {
        let server = MockServer::new();
        server.set_server_version(80_100);
        let registry = Arc::new(PoolRegistry::new(server.driver()));
        let mut db = DatabaseWrapper::new(
            "default",
            DatabaseSettings::new("app"),
            registry,
            BackendOptions::default().autocommit(true),
        );

        let err = db.cursor().await.unwrap_err();
        assert!(err.is_configuration());
        assert!(!db.is_connected());
        assert!(db.features().is_none());
    }

    #[tokio::test]
    async fn test_commit_and_rollback_without_connection() {
        let server = MockServer::new();
        let mut db = wrapper(&server, DatabaseSettings::new("app"));
        db.commit().await.unwrap();
        db.rollback().await.unwrap();
        assert_eq!(server.pools_created(), 0);
    }

    #[tokio::test]
    async fn test_rollback_ends_transaction() {
        let server = MockServer::new();
        let mut db = wrapper(&server, DatabaseSettings::new("app"));

        let mut cursor = db.cursor().await.unwrap();
        cursor.execute("UPDATE t SET x = 1", &[]).await.unwrap();
        db.rollback().await.unwrap();

        let conn = db.connection().unwrap();
        assert_eq!(conn.transaction_status().unwrap(), TransactionStatus::Idle);
    }
}
