//! # dbpool-backend
//!
//! Per-unit-of-work database session built on top of the pool registry.
//!
//! A [`DatabaseWrapper`] is what request-handling code holds for one alias
//! during one unit of work. The first call to [`DatabaseWrapper::cursor`]
//! borrows a connection from the alias's pool and prepares the session:
//!
//! 1. client encoding set to UTF-8
//! 2. session timezone aligned with the application's (`UTC` when
//!    [`BackendOptions::use_tz`] is set)
//! 3. isolation level and autocommit mode applied
//! 4. server [`Features`] resolved
//! 5. a [`ConnectionCreated`] signal broadcast
//!
//! Later calls reuse the same connection until [`DatabaseWrapper::close`]
//! hands it back to the pool.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dbpool_backend::{BackendOptions, DatabaseWrapper};
//! use dbpool_core::{DatabaseSettings, PoolRegistry};
//!
//! let registry = Arc::new(PoolRegistry::new(driver));
//! let settings = DatabaseSettings::new("app").option("MAX_CONNS", 4);
//!
//! let mut db = DatabaseWrapper::new("default", settings, registry, BackendOptions::default());
//! let mut cursor = db.cursor().await?;
//! cursor.execute("SELECT 1", &[]).await?;
//! let row = cursor.fetch_one();
//! db.close().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cursor;
pub mod options;
pub mod signals;
pub mod timezone;
pub mod wrapper;

pub use cursor::Cursor;
pub use options::{BackendOptions, Features};
pub use signals::{ConnectionCreated, Signals};
pub use wrapper::DatabaseWrapper;
