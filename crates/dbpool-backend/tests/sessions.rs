//! Session setup and checkout behavior of `DatabaseWrapper`.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p dbpool-backend --test sessions
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use dbpool_backend::{BackendOptions, ConnectionCreated, DatabaseWrapper, Signals};
use dbpool_core::{DatabaseSettings, PoolRegistry};
use dbpool_driver::{Connection, Value};
use dbpool_testing::MockServer;

fn settings(max: u32) -> DatabaseSettings {
    DatabaseSettings::new("app").option("MAX_CONNS", max)
}

fn session(registry: &Arc<PoolRegistry>, settings: DatabaseSettings) -> DatabaseWrapper {
    DatabaseWrapper::new(
        "default",
        settings,
        Arc::clone(registry),
        BackendOptions::default(),
    )
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_concurrent_cursors_share_two_connections() {
    let server = MockServer::new();
    let registry = Arc::new(PoolRegistry::new(server.driver()));

    let mut handles = Vec::new();
    for _ in 0..3 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            let mut db = session(&registry, settings(2));
            let mut cursor = db.cursor().await.unwrap();
            cursor.execute("SELECT 1", &[]).await.unwrap();
            let row = cursor.fetch_one().unwrap();
            assert_eq!(row.get(0), Some(&Value::Int(1)));
            db.close().await.unwrap();
        }));
    }

    for handle in handles {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("third cursor must get a connection once one is closed")
            .unwrap();
    }

    assert_eq!(server.pools_created(), 1);
    assert_eq!(server.connections_opened(), 2);
    assert_eq!(registry.get("default").unwrap().status().in_use, 0);
}

#[tokio::test]
async fn test_killed_connection_recovers_with_test_on_borrow() {
    let server = MockServer::new();
    let registry = Arc::new(PoolRegistry::new(server.driver()));
    let settings = settings(2)
        .option("MIN_CONNS", 1)
        .option("TEST_ON_BORROW", true);

    // Warm up the pool.
    let mut db = session(&registry, settings.clone());
    let first_pid = {
        let mut cursor = db.cursor().await.unwrap();
        cursor.execute("SELECT 1", &[]).await.unwrap();
        cursor.connection().backend_pid().unwrap()
    };
    db.close().await.unwrap();

    server.kill(first_pid);

    let mut db = session(&registry, settings);
    let mut cursor = db.cursor().await.unwrap();
    cursor.execute("SELECT 1", &[]).await.unwrap();
    assert_eq!(cursor.fetch_one().unwrap().get(0), Some(&Value::Int(1)));
    assert_ne!(cursor.connection().backend_pid().unwrap(), first_pid);
}

#[tokio::test]
async fn test_setup_runs_once_per_checkout() {
    let server = MockServer::new();
    let registry = Arc::new(PoolRegistry::new(server.driver()));
    let mut db = session(&registry, settings(1));

    for _ in 0..3 {
        let mut cursor = db.cursor().await.unwrap();
        cursor.execute("SELECT 1", &[]).await.unwrap();
    }
    assert_eq!(server.count_statements("SET client_encoding"), 1);

    db.close().await.unwrap();
    db.cursor().await.unwrap();
    assert_eq!(server.count_statements("SET client_encoding"), 2);
    assert_eq!(server.connections_opened(), 1);
}

#[tokio::test]
async fn test_dropping_wrapper_returns_connection() {
    let server = MockServer::new();
    let registry = Arc::new(PoolRegistry::new(server.driver()));

    {
        let mut db = session(&registry, settings(1));
        db.ensure_connection().await.unwrap();
        assert_eq!(registry.get("default").unwrap().status().in_use, 1);
    }

    let descriptor = registry.get("default").unwrap();
    assert_eq!(descriptor.status().in_use, 0);
    assert_eq!(descriptor.status().available, 1);
}

#[tokio::test]
async fn test_changed_settings_leave_open_session_usable() {
    let server = MockServer::new();
    let registry = Arc::new(PoolRegistry::new(server.driver()));

    let mut old = session(&registry, settings(1));
    old.ensure_connection().await.unwrap();

    let mut new = session(&registry, settings(2));
    new.cursor().await.unwrap().execute("SELECT 1", &[]).await.unwrap();
    assert_eq!(server.pools_created(), 2);

    let mut cursor = old.cursor().await.unwrap();
    cursor.execute("SELECT 1", &[]).await.unwrap();
    let closed = server.connections_closed();
    old.close().await.unwrap();
    assert_eq!(server.connections_closed(), closed + 1);

    new.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_waiter_on_replaced_pool_gets_connection() {
    let server = MockServer::new();
    let registry = Arc::new(PoolRegistry::new(server.driver()));

    let mut holder = session(&registry, settings(1));
    holder.ensure_connection().await.unwrap();

    // Blocks on the full pool until the pool is replaced.
    let waiter = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let mut db = session(&registry, settings(1));
            let mut cursor = db.cursor().await?;
            cursor.execute("SELECT 1", &[]).await?;
            db.close().await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    registry.get_or_create("default", &settings(2)).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter must not hang after the pool is replaced")
        .unwrap()
        .unwrap();

    holder.close().await.unwrap();
}

// =============================================================================
// Timezone
// =============================================================================

#[tokio::test]
async fn test_time_zone_set_only_when_different() {
    let server = MockServer::new();
    let registry = Arc::new(PoolRegistry::new(server.driver()));
    let settings = settings(1).time_zone("Asia/Tokyo");

    let mut db = session(&registry, settings.clone());
    db.ensure_connection().await.unwrap();
    let pid = db.connection().unwrap().backend_pid().unwrap();
    assert_eq!(
        db.connection()
            .unwrap()
            .parameter_status("TimeZone")
            .unwrap()
            .as_deref(),
        Some("Asia/Tokyo")
    );
    db.close().await.unwrap();

    // Same physical connection, already in the right zone.
    let mut db = session(&registry, settings);
    db.ensure_connection().await.unwrap();
    assert_eq!(db.connection().unwrap().backend_pid().unwrap(), pid);
    assert_eq!(server.count_statements("SET TIME ZONE"), 1);
    assert!(!db.connection().unwrap().autocommit().unwrap());
}

#[tokio::test]
async fn test_use_tz_forces_utc() {
    let server = MockServer::new();
    server.set_timezone("Europe/Berlin");
    let registry = Arc::new(PoolRegistry::new(server.driver()));
    let settings = settings(1).time_zone("Asia/Tokyo");

    let mut db = DatabaseWrapper::new(
        "default",
        settings,
        Arc::clone(&registry),
        BackendOptions::default().use_tz(true),
    );
    let mut cursor = db.cursor().await.unwrap();
    cursor.execute("SELECT now()", &[]).await.unwrap();
    let row = cursor.fetch_one().unwrap();

    assert!(matches!(row.get(0), Some(Value::TimestampTz(_))));
    assert_eq!(server.count_statements("SET TIME ZONE 'UTC'"), 1);
}

#[tokio::test]
async fn test_naive_timestamps_without_use_tz() {
    let server = MockServer::new();
    let registry = Arc::new(PoolRegistry::new(server.driver()));
    let mut db = session(&registry, settings(1));

    let mut cursor = db.cursor().await.unwrap();
    cursor.execute("SELECT now()", &[]).await.unwrap();
    let rows = cursor.fetch_all();

    assert_eq!(rows.len(), 1);
    assert!(matches!(rows[0].get(0), Some(Value::Timestamp(_))));
    assert_eq!(server.count_statements("SET TIME ZONE"), 0);
}

#[tokio::test]
async fn test_invalid_time_zone_is_configuration_error() {
    let server = MockServer::new();
    let registry = Arc::new(PoolRegistry::new(server.driver()));
    let mut db = session(&registry, settings(1).time_zone("UTC'; DROP TABLE users; --"));

    let err = db.cursor().await.unwrap_err();
    assert!(err.is_configuration());
    assert!(!db.is_connected());
    assert_eq!(registry.get("default").unwrap().status().in_use, 0);
}

// =============================================================================
// Features and signals
// =============================================================================

#[tokio::test]
async fn test_autocommit_session() {
    let server = MockServer::new();
    let registry = Arc::new(PoolRegistry::new(server.driver()));
    let settings = settings(1).option("autocommit", true);
    let options = BackendOptions::from_settings(&settings).unwrap();
    let mut db = DatabaseWrapper::new("default", settings, Arc::clone(&registry), options);

    let mut cursor = db.cursor().await.unwrap();
    assert_eq!(cursor.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap(), 1);
    assert_eq!(cursor.rowcount(), Some(1));
    assert!(cursor.connection().autocommit().unwrap());

    let features = db.features().unwrap();
    assert!(features.can_return_id_from_insert);
    assert!(features.uses_savepoints);

    // autocommit is a backend option, never a driver parameter.
    let (params, _, _) = server.pool_params().remove(0);
    assert!(!params.contains("autocommit"));
}

#[tokio::test]
async fn test_connection_created_once_per_checkout() {
    let server = MockServer::new();
    let registry = Arc::new(PoolRegistry::new(server.driver()));
    let signals = Signals::new();
    let mut events = signals.subscribe();

    let mut db = session(&registry, settings(1)).with_signals(signals.clone());
    db.cursor().await.unwrap();
    db.cursor().await.unwrap();
    let pid = db.connection().unwrap().backend_pid().unwrap();
    db.close().await.unwrap();

    let mut other = session(&registry, settings(1)).with_signals(signals);
    other.cursor().await.unwrap();

    let expected = ConnectionCreated {
        alias: "default".into(),
        backend_pid: pid,
    };
    assert_eq!(events.recv().await.unwrap(), expected);
    assert_eq!(events.recv().await.unwrap(), expected);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_wrapper_subscription() {
    let server = MockServer::new();
    let registry = Arc::new(PoolRegistry::new(server.driver()));
    let mut db = session(&registry, settings(1));
    let mut events = db.subscribe();

    db.ensure_connection().await.unwrap();
    db.ensure_connection().await.unwrap();

    assert_eq!(events.recv().await.unwrap().alias, "default");
    assert!(events.try_recv().is_err());
}
