//! Registry of pools keyed by database alias.

use std::collections::HashMap;
use std::sync::Arc;

use dbpool_driver::PoolFactory;
use parking_lot::{Mutex, RwLock};

use crate::descriptor::PoolDescriptor;
use crate::error::{PoolError, Result};
use crate::fingerprint::Fingerprint;
use crate::settings::DatabaseSettings;

/// Owns one [`PoolDescriptor`] per alias.
///
/// Create one registry per process and share it (`Arc<PoolRegistry>`) with
/// every unit of work. Lookups of an up-to-date pool only take a read lock.
/// Creating or replacing a pool happens under a per-alias install lock, which
/// serializes installers of the same alias but never other aliases or
/// connection traffic.
///
/// # Example
///
/// ```rust
/// # tokio_test::block_on(async {
/// use std::sync::Arc;
/// use dbpool_core::{DatabaseSettings, PoolRegistry};
/// use dbpool_driver::Connection;
/// use dbpool_testing::MockServer;
///
/// let server = MockServer::new();
/// let registry = Arc::new(PoolRegistry::new(server.driver()));
/// let settings = DatabaseSettings::new("app").option("MAX_CONNS", 4);
///
/// let descriptor = registry.get_or_create("default", &settings).await.unwrap();
/// let mut conn = descriptor.acquire().await.unwrap();
/// conn.execute("SELECT 1", &[]).await.unwrap();
/// conn.close().await.unwrap();
/// # });
/// ```
pub struct PoolRegistry {
    factory: Arc<dyn PoolFactory>,
    pools: RwLock<HashMap<String, Arc<PoolDescriptor>>>,
    install_locks: Mutex<HashMap<String, Arc<InstallLock>>>,
}

type InstallLock = tokio::sync::Mutex<()>;

impl PoolRegistry {
    /// Create an empty registry building pools with `factory`.
    pub fn new(factory: impl PoolFactory) -> Self {
        Self::with_factory(Arc::new(factory))
    }

    /// Create an empty registry from a shared factory.
    pub fn with_factory(factory: Arc<dyn PoolFactory>) -> Self {
        Self {
            factory,
            pools: RwLock::new(HashMap::new()),
            install_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get the pool for `alias`, building it on first use or when `settings`
    /// no longer match the settings the current pool was built from.
    ///
    /// A replaced pool is retired: its idle connections are closed and
    /// connections still borrowed from it are closed when released.
    ///
    /// Fails with [`PoolError::Configuration`] when the settings are invalid
    /// or the driver rejects them.
    pub async fn get_or_create(
        &self,
        alias: &str,
        settings: &DatabaseSettings,
    ) -> Result<Arc<PoolDescriptor>> {
        let fingerprint = Fingerprint::of(settings)?;
        if let Some(current) = self.current(alias, &fingerprint) {
            return Ok(current);
        }

        let lock = self.install_lock(alias);
        let _guard = lock.lock().await;

        // Another task may have installed the same settings while we waited.
        if let Some(current) = self.current(alias, &fingerprint) {
            tracing::debug!(alias, "reusing pool installed by a concurrent caller");
            return Ok(current);
        }

        let config = fingerprint.config();
        let (min, max) = (config.min_connections, config.max_connections);
        tracing::debug!(alias, fingerprint = %fingerprint, min, max, "creating connection pool");

        let pool = self
            .factory
            .create_pool(fingerprint.params(), min, max)
            .await
            .map_err(PoolError::from_construction)?;

        let descriptor = Arc::new(PoolDescriptor::new(alias, fingerprint, pool));
        let previous = self
            .pools
            .write()
            .insert(alias.to_string(), Arc::clone(&descriptor));

        match previous {
            Some(previous) => {
                tracing::info!(
                    alias,
                    old = %previous.fingerprint(),
                    new = %descriptor.fingerprint(),
                    min,
                    max,
                    "settings changed, connection pool replaced"
                );
                previous.retire();
            }
            None => tracing::info!(alias, min, max, "connection pool created"),
        }

        Ok(descriptor)
    }

    /// The installed pool for `alias`, if any.
    #[must_use]
    pub fn get(&self, alias: &str) -> Option<Arc<PoolDescriptor>> {
        self.pools.read().get(alias).cloned()
    }

    /// Aliases with an installed pool, sorted.
    #[must_use]
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.pools.read().keys().cloned().collect();
        aliases.sort();
        aliases
    }

    /// Number of installed pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    /// Whether no pool is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }

    /// Retire and forget the pool for `alias`.
    pub async fn remove(&self, alias: &str) -> Option<Arc<PoolDescriptor>> {
        let lock = self.install_lock(alias);
        let _guard = lock.lock().await;
        let removed = self.pools.write().remove(alias);
        if let Some(descriptor) = &removed {
            descriptor.retire();
        }
        removed
    }

    /// Retire and forget every pool.
    pub async fn close_all(&self) {
        // Locks are taken in alias order so concurrent callers cannot deadlock.
        let mut locks: Vec<(String, Arc<InstallLock>)> = self
            .install_locks
            .lock()
            .iter()
            .map(|(alias, lock)| (alias.clone(), Arc::clone(lock)))
            .collect();
        locks.sort_by(|a, b| a.0.cmp(&b.0));
        let mut guards = Vec::with_capacity(locks.len());
        for (_, lock) in &locks {
            guards.push(lock.lock().await);
        }

        let drained: Vec<Arc<PoolDescriptor>> =
            self.pools.write().drain().map(|(_, d)| d).collect();
        for descriptor in &drained {
            descriptor.retire();
        }
        tracing::info!(pools = drained.len(), "all connection pools closed");
    }

    fn install_lock(&self, alias: &str) -> Arc<InstallLock> {
        let mut locks = self.install_locks.lock();
        Arc::clone(
            locks
                .entry(alias.to_string())
                .or_insert_with(|| Arc::new(InstallLock::new(()))),
        )
    }

    fn current(&self, alias: &str, fingerprint: &Fingerprint) -> Option<Arc<PoolDescriptor>> {
        self.pools
            .read()
            .get(alias)
            .filter(|descriptor| descriptor.fingerprint() == fingerprint)
            .cloned()
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("aliases", &self.aliases())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MAX_CONNS;
    use dbpool_testing::MockServer;

    #[tokio::test]
    async fn test_first_use_creates_pool() {
        let server = MockServer::new();
        let registry = PoolRegistry::new(server.driver());
        assert!(registry.is_empty());

        let settings = DatabaseSettings::new("app").option(MAX_CONNS, 2);
        let descriptor = registry.get_or_create("default", &settings).await.unwrap();

        assert_eq!(descriptor.alias(), "default");
        assert_eq!(descriptor.config().max_connections, 2);
        assert_eq!(registry.aliases(), vec!["default".to_string()]);
        assert_eq!(server.pools_created(), 1);
    }

    #[tokio::test]
    async fn test_same_settings_reuse_pool() {
        let server = MockServer::new();
        let registry = PoolRegistry::new(server.driver());
        let settings = DatabaseSettings::new("app");

        let first = registry.get_or_create("default", &settings).await.unwrap();
        let second = registry.get_or_create("default", &settings).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(server.pools_created(), 1);
    }

    #[tokio::test]
    async fn test_aliases_are_independent() {
        let server = MockServer::new();
        let registry = PoolRegistry::new(server.driver());

        registry
            .get_or_create("default", &DatabaseSettings::new("app"))
            .await
            .unwrap();
        registry
            .get_or_create("replica", &DatabaseSettings::new("app").host("replica"))
            .await
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(server.pools_created(), 2);
    }

    #[tokio::test]
    async fn test_configuration_error_installs_nothing() {
        let server = MockServer::new();
        let registry = PoolRegistry::new(server.driver());

        let err = registry
            .get_or_create("default", &DatabaseSettings::new(""))
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        assert!(registry.get("default").is_none());
        assert_eq!(server.pools_created(), 0);
    }

    #[tokio::test]
    async fn test_remove_retires_pool() {
        let server = MockServer::new();
        let registry = PoolRegistry::new(server.driver());
        let descriptor = registry
            .get_or_create("default", &DatabaseSettings::new("app"))
            .await
            .unwrap();

        let removed = registry.remove("default").await.unwrap();
        assert!(Arc::ptr_eq(&descriptor, &removed));
        assert!(removed.is_retired());
        assert!(registry.remove("default").await.is_none());
        assert_eq!(server.live_connections(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_aliases_install_in_parallel() {
        let server = MockServer::new();
        let registry = Arc::new(PoolRegistry::new(server.driver()));
        server.set_pool_delay(std::time::Duration::from_millis(300));

        let started = std::time::Instant::now();
        let settings_a = DatabaseSettings::new("a");
        let settings_b = DatabaseSettings::new("b");
        let (a, b) = tokio::join!(
            registry.get_or_create("a", &settings_a),
            registry.get_or_create("b", &settings_b),
        );
        let elapsed = started.elapsed();

        a.unwrap();
        b.unwrap();
        assert_eq!(server.pools_created(), 2);
        assert!(
            elapsed < std::time::Duration::from_millis(550),
            "installs of distinct aliases ran one after the other: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_close_all() {
        let server = MockServer::new();
        let registry = PoolRegistry::new(server.driver());
        for alias in ["a", "b", "c"] {
            registry
                .get_or_create(alias, &DatabaseSettings::new(alias))
                .await
                .unwrap();
        }
        assert_eq!(server.live_connections(), 3);

        registry.close_all().await;
        assert!(registry.is_empty());
        assert_eq!(server.live_connections(), 0);
    }
}
