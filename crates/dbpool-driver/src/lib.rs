//! # dbpool-driver
//!
//! Capability surface between the pool registry and a PostgreSQL driver.
//!
//! The registry never talks to a wire protocol directly. Everything it needs
//! from a driver is expressed by three traits:
//!
//! - [`Connection`]: one physical session (execute, transaction control,
//!   session parameters, close)
//! - [`PhysicalPool`]: a bounded set of physical connections with
//!   `acquire`, `release` and `release(discard = true)`
//! - [`PoolFactory`]: builds a [`PhysicalPool`] from [`ConnectionParams`]
//!   and a min/max size
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbpool_driver::{ConnectionParams, PoolFactory};
//!
//! let params = ConnectionParams::from_dsn("dbname=app user=web host=db")?;
//! let pool = factory.create_pool(&params, 2, 8).await?;
//!
//! let mut conn = pool.acquire().await?;
//! let result = conn.execute("SELECT 1", &[]).await?;
//! pool.release(conn, false);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod params;
pub mod pool;
pub mod row;
pub mod transaction;

pub use connection::{Connection, QueryResult};
pub use error::{Error, Result};
pub use params::ConnectionParams;
pub use pool::{PhysicalPool, PoolFactory, PoolStatus};
pub use row::{Row, Value};
pub use transaction::{IsolationLevel, TransactionStatus};
