//! # dbpool-testing
//!
//! In-memory stand-in for a PostgreSQL server and driver.
//!
//! [`MockServer`] plays the database: it hands out backend pids, tracks which
//! sessions are alive, records every statement and can kill sessions to
//! simulate a server restart. [`MockDriver`] implements
//! [`PoolFactory`](dbpool_driver::PoolFactory) on top of it and builds
//! [`MockPool`]s with real backpressure, so pool and registry tests observe
//! blocking, reuse and discard the way they would against a live server.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbpool_testing::MockServer;
//!
//! let server = MockServer::new();
//! let factory = server.driver();
//! let pool = factory.create_pool(&params, 1, 2).await?;
//!
//! server.kill_all();
//! assert!(pool.acquire().await?.execute("SELECT 1", &[]).await.is_err());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod pool;
pub mod server;

pub use connection::MockConnection;
pub use pool::{MockDriver, MockPool};
pub use server::{MockServer, Statement};
