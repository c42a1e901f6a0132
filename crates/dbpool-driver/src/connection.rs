//! Physical connection capability.

use async_trait::async_trait;

use crate::error::Result;
use crate::row::{Row, Value};
use crate::transaction::{IsolationLevel, TransactionStatus};

/// Outcome of executing one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Rows returned by the statement, if any.
    pub rows: Vec<Row>,
    /// Number of rows affected (or returned, for `SELECT`).
    pub rows_affected: u64,
}

impl QueryResult {
    /// A result carrying rows; `rows_affected` is the row count.
    #[must_use]
    pub fn with_rows(rows: Vec<Row>) -> Self {
        let rows_affected = rows.len() as u64;
        Self {
            rows,
            rows_affected,
        }
    }

    /// A result for a statement that returns no rows.
    #[must_use]
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected,
        }
    }
}

/// One database session.
///
/// Implemented by a driver's physical connection and by the pool's borrowed
/// handle, which forwards everything except [`close`](Connection::close).
/// Callers hold a `Box<dyn Connection>` or the handle and cannot tell the
/// two apart.
///
/// Dropping a physical connection closes its socket.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Process id of the server backend serving this session.
    fn backend_pid(&self) -> Result<u32>;

    /// Whether the session is known to be closed or broken.
    fn is_closed(&self) -> bool;

    /// Whether the session runs in autocommit mode.
    fn autocommit(&self) -> Result<bool>;

    /// Current transaction status.
    fn transaction_status(&self) -> Result<TransactionStatus>;

    /// A run-time parameter reported by the server, such as `TimeZone`.
    fn parameter_status(&self, name: &str) -> Result<Option<String>>;

    /// Server version in `PG_VERSION_NUM` form (`90602` for 9.6.2).
    fn server_version(&self) -> Result<u32>;

    /// Set the client text encoding.
    async fn set_client_encoding(&mut self, encoding: &str) -> Result<()>;

    /// Switch autocommit mode on or off.
    async fn set_autocommit(&mut self, enabled: bool) -> Result<()>;

    /// Set the session isolation level.
    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()>;

    /// Execute a statement.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Close the session.
    async fn close(&mut self) -> Result<()>;
}
