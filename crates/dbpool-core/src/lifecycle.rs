//! Borrowed connection lifecycle and test-on-borrow validation.

use dbpool_driver::{Connection, TransactionStatus};

/// Probe statement used when `TEST_ON_BORROW_QUERY` is not set.
pub const DEFAULT_PROBE_QUERY: &str = "SELECT 1";

/// State of a borrowed connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The handle owns a physical connection.
    Active,
    /// The physical connection went back to its pool. Terminal.
    Released,
}

/// Liveness check run on a connection before handing it out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidationPolicy {
    /// Statement executed on the borrowed connection.
    pub query: String,
    /// Connections tried before giving up.
    pub max_attempts: u32,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            query: DEFAULT_PROBE_QUERY.to_string(),
            max_attempts: 1,
        }
    }
}

impl ValidationPolicy {
    /// Create a policy running `query`.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Set the number of connections tried before giving up.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Run the probe on `conn`.
    ///
    /// When the connection is not in autocommit mode the probe may have
    /// opened a transaction; it is rolled back so the caller receives a
    /// connection with no transaction in progress.
    pub async fn probe(&self, conn: &mut dyn Connection) -> dbpool_driver::Result<()> {
        conn.execute(&self.query, &[]).await?;

        if !conn.autocommit()? && conn.transaction_status()? != TransactionStatus::Idle {
            conn.rollback().await?;
        }
        Ok(())
    }
}
