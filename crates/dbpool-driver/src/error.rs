//! Driver error types.

use std::time::Duration;

use thiserror::Error;

/// Result alias used across the driver capability traits.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by a driver, a physical pool or a connection handle.
#[derive(Debug, Error)]
pub enum Error {
    /// Error reported by the database server.
    #[error("database error [{code}]: {message}")]
    Database {
        /// SQLSTATE code.
        code: String,
        /// Server message.
        message: String,
    },

    /// The physical connection is no longer usable.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The handle was already returned to its pool.
    #[error("connection already released to its pool")]
    ConnectionReleased,

    /// The physical pool has been closed.
    #[error("connection pool is closed")]
    PoolClosed,

    /// Timed out waiting for a physical connection.
    #[error("timed out acquiring a connection after {0:?}")]
    Timeout(Duration),

    /// Invalid connection parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error on the underlying socket.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a database error from a SQLSTATE code and message.
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether the error means the connection itself is broken, as opposed
    /// to a statement failing on a healthy connection.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::ConnectionClosed(_) | Self::Io(_) => true,
            // Class 08: connection exception
            Self::Database { code, .. } => code.starts_with("08"),
            _ => false,
        }
    }
}
