//! # dbpool-core
//!
//! Process-wide registry of database connection pools, one per alias.
//!
//! The registry lazily builds exactly one physical pool for each alias,
//! rebuilds it when the alias's settings change underneath a running
//! process, and hands out [`PooledConnection`] handles that return their
//! physical connection to the pool on `close()` instead of terminating it.
//!
//! ## Features
//!
//! - Lazy, race-free pool construction (double-checked under an install lock)
//! - Config drift detection through a settings [`Fingerprint`]
//! - Optional test-on-borrow validation with bounded retries
//! - Transparent connection proxy implementing the driver's
//!   [`Connection`](dbpool_driver::Connection) trait
//! - Per-pool checkout and validation metrics
//!
//! ## Example
//!
//! ```rust,ignore
//! use dbpool_core::{DatabaseSettings, PoolRegistry};
//!
//! let registry = PoolRegistry::new(driver);
//! let settings = DatabaseSettings::new("app")
//!     .user("web")
//!     .option("MAX_CONNS", 8)
//!     .option("TEST_ON_BORROW", true);
//!
//! let descriptor = registry.get_or_create("default", &settings).await?;
//! let mut conn = descriptor.acquire().await?;
//! conn.execute("SELECT 1", &[]).await?;
//! conn.close().await?; // back to the pool
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod descriptor;
pub mod error;
pub mod fingerprint;
pub mod lifecycle;
pub mod registry;
pub mod settings;

// Configuration
pub use config::PoolConfig;
pub use settings::DatabaseSettings;

// Error types
pub use error::{PoolError, Result};

// Pool types
pub use connection::PooledConnection;
pub use descriptor::{PoolDescriptor, PoolMetrics};
pub use fingerprint::Fingerprint;
pub use registry::PoolRegistry;

// Lifecycle management
pub use lifecycle::{ConnectionState, ValidationPolicy};
