//! Mock physical connection.
//!
//! Understands just enough SQL to drive pool tests:
//!
//! | Statement | Result |
//! |---|---|
//! | `SELECT 1` | one row `(1,)` |
//! | `SELECT $1` | one row echoing the first parameter |
//! | `SELECT pg_sleep(<secs>)` | sleeps, then one row `(NULL,)` |
//! | `SELECT now()` | one row with a naive UTC timestamp |
//! | `SHOW TimeZone` | one row with the session timezone |
//! | `SET TIME ZONE '<tz>'` | changes the session timezone |
//! | `BEGIN` / `COMMIT` / `ROLLBACK` | transaction control |
//! | `INSERT` / `UPDATE` / `DELETE ...` | one affected row |
//!
//! Anything else fails with SQLSTATE `42601`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dbpool_driver::{
    Connection, Error, IsolationLevel, QueryResult, Result, Row, TransactionStatus, Value,
};

use crate::server::MockServer;

/// A session on a [`MockServer`].
#[derive(Debug)]
pub struct MockConnection {
    server: Arc<MockServer>,
    backend_pid: u32,
    server_version: u32,
    autocommit: bool,
    status: TransactionStatus,
    isolation_level: IsolationLevel,
    parameters: HashMap<String, String>,
    closed: bool,
}

impl MockConnection {
    /// Open a new session on `server`.
    #[must_use]
    pub fn open(server: Arc<MockServer>) -> Self {
        let (backend_pid, timezone, server_version) = server.open_session();
        tracing::trace!(backend_pid, "mock session opened");

        let mut parameters = HashMap::new();
        parameters.insert("TimeZone".to_string(), timezone);
        parameters.insert("client_encoding".to_string(), "SQL_ASCII".to_string());

        Self {
            server,
            backend_pid,
            server_version,
            autocommit: false,
            status: TransactionStatus::Idle,
            isolation_level: IsolationLevel::default(),
            parameters,
            closed: false,
        }
    }

    /// Isolation level last set on the session.
    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    fn ensure_usable(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed("connection already closed".into()));
        }
        if self.server.is_killed(self.backend_pid) {
            self.closed = true;
            self.status = TransactionStatus::Unknown;
            return Err(Error::ConnectionClosed(
                "server closed the connection unexpectedly".into(),
            ));
        }
        Ok(())
    }

    fn run(&mut self, sql: &str, params: &[Value]) -> Result<Reply> {
        let statement = sql.trim().trim_end_matches(';').trim();
        let upper = statement.to_ascii_uppercase();

        match upper.as_str() {
            "BEGIN" => {
                self.status = TransactionStatus::InTransaction;
                return Ok(Reply::Done(QueryResult::affected(0)));
            }
            "COMMIT" | "ROLLBACK" => {
                self.status = TransactionStatus::Idle;
                return Ok(Reply::Done(QueryResult::affected(0)));
            }
            _ => {}
        }

        if self.status == TransactionStatus::InError {
            return Err(Error::database(
                "25P02",
                "current transaction is aborted, commands ignored until end of transaction block",
            ));
        }
        if !self.autocommit && self.status == TransactionStatus::Idle {
            self.status = TransactionStatus::InTransaction;
        }

        let reply = match upper.as_str() {
            "SELECT 1" => Reply::Done(single("?column?", Value::Int(1))),
            "SELECT $1" | "SELECT %S" => {
                let value = params.first().cloned().unwrap_or(Value::Null);
                Reply::Done(single("?column?", value))
            }
            "SELECT NOW()" => Reply::Done(single("now", Value::Timestamp(Utc::now().naive_utc()))),
            "SHOW TIMEZONE" | "SHOW TIME ZONE" => {
                let tz = self.parameters.get("TimeZone").cloned().unwrap_or_default();
                Reply::Done(single("TimeZone", Value::Text(tz)))
            }
            _ if upper.starts_with("SELECT PG_SLEEP(") => {
                let secs: f64 = upper["SELECT PG_SLEEP(".len()..]
                    .trim_end_matches(')')
                    .trim()
                    .parse()
                    .map_err(|_| Error::database("22P02", "invalid input syntax for pg_sleep"))?;
                Reply::Sleep(Duration::from_secs_f64(secs.max(0.0)))
            }
            _ if upper.starts_with("SET TIME ZONE ") => {
                let tz = statement["SET TIME ZONE ".len()..].trim().trim_matches('\'');
                self.parameters
                    .insert("TimeZone".to_string(), tz.to_string());
                Reply::Done(QueryResult::affected(0))
            }
            _ if upper.starts_with("SET ") => Reply::Done(QueryResult::affected(0)),
            _ if ["INSERT ", "UPDATE ", "DELETE "]
                .iter()
                .any(|verb| upper.starts_with(verb)) =>
            {
                Reply::Done(QueryResult::affected(1))
            }
            _ => {
                if self.status == TransactionStatus::InTransaction {
                    self.status = TransactionStatus::InError;
                }
                return Err(Error::database(
                    "42601",
                    format!("syntax error in statement: {statement}"),
                ));
            }
        };

        Ok(reply)
    }
}

enum Reply {
    Done(QueryResult),
    Sleep(Duration),
}

fn single(column: &str, value: Value) -> QueryResult {
    QueryResult::with_rows(vec![Row::new(vec![column.to_string()], vec![value])])
}

#[async_trait]
impl Connection for MockConnection {
    fn backend_pid(&self) -> Result<u32> {
        Ok(self.backend_pid)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn autocommit(&self) -> Result<bool> {
        Ok(self.autocommit)
    }

    fn transaction_status(&self) -> Result<TransactionStatus> {
        Ok(self.status)
    }

    fn parameter_status(&self, name: &str) -> Result<Option<String>> {
        Ok(self.parameters.get(name).cloned())
    }

    fn server_version(&self) -> Result<u32> {
        Ok(self.server_version)
    }

    async fn set_client_encoding(&mut self, encoding: &str) -> Result<()> {
        self.ensure_usable()?;
        self.server
            .record(self.backend_pid, &format!("SET client_encoding TO '{encoding}'"));
        self.parameters
            .insert("client_encoding".to_string(), encoding.to_string());
        Ok(())
    }

    async fn set_autocommit(&mut self, enabled: bool) -> Result<()> {
        self.ensure_usable()?;
        if self.status.in_transaction() {
            return Err(Error::database(
                "25001",
                "autocommit cannot be changed inside a transaction",
            ));
        }
        self.autocommit = enabled;
        Ok(())
    }

    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        self.ensure_usable()?;
        if self.status.in_transaction() {
            return Err(Error::database(
                "25001",
                "isolation level cannot be changed inside a transaction",
            ));
        }
        self.server.record(self.backend_pid, level.as_sql());
        self.isolation_level = level;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.ensure_usable()?;
        self.server.record(self.backend_pid, sql);

        match self.run(sql, params)? {
            Reply::Done(result) => Ok(result),
            Reply::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(single("pg_sleep", Value::Null))
            }
        }
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.server.record(self.backend_pid, "COMMIT");
        self.status = TransactionStatus::Idle;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.server.record(self.backend_pid, "ROLLBACK");
        self.status = TransactionStatus::Idle;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.server.close_session(self.backend_pid);
        }
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.server.close_session(self.backend_pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_select_one() {
        let server = MockServer::new();
        let mut conn = MockConnection::open(server.clone());

        let result = conn.execute("SELECT 1", &[]).await.unwrap();
        assert_eq!(result.rows[0].get(0), Some(&Value::Int(1)));
        assert_eq!(
            conn.transaction_status().unwrap(),
            TransactionStatus::InTransaction
        );

        conn.rollback().await.unwrap();
        assert_eq!(conn.transaction_status().unwrap(), TransactionStatus::Idle);
    }

    #[tokio::test]
    async fn test_autocommit_skips_implicit_transaction() {
        let server = MockServer::new();
        let mut conn = MockConnection::open(server);

        conn.set_autocommit(true).await.unwrap();
        conn.execute("SELECT 1", &[]).await.unwrap();
        assert_eq!(conn.transaction_status().unwrap(), TransactionStatus::Idle);
    }

    #[tokio::test]
    async fn test_killed_session_fails_and_closes() {
        let server = MockServer::new();
        let mut conn = MockConnection::open(server.clone());

        server.kill(conn.backend_pid().unwrap());
        assert!(!conn.is_closed());

        let err = conn.execute("SELECT 1", &[]).await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_set_time_zone() {
        let server = MockServer::new();
        server.set_timezone("Europe/Berlin");
        let mut conn = MockConnection::open(server);

        assert_eq!(
            conn.parameter_status("TimeZone").unwrap().as_deref(),
            Some("Europe/Berlin")
        );
        conn.set_autocommit(true).await.unwrap();
        conn.execute("SET TIME ZONE 'UTC'", &[]).await.unwrap();
        assert_eq!(
            conn.parameter_status("TimeZone").unwrap().as_deref(),
            Some("UTC")
        );
    }

    #[tokio::test]
    async fn test_failed_statement_aborts_transaction() {
        let server = MockServer::new();
        let mut conn = MockConnection::open(server);

        conn.execute("SELECT 1", &[]).await.unwrap();
        assert!(conn.execute("SELEC 1", &[]).await.is_err());
        assert_eq!(conn.transaction_status().unwrap(), TransactionStatus::InError);
        assert!(conn.execute("SELECT 1", &[]).await.is_err());

        conn.rollback().await.unwrap();
        assert!(conn.execute("SELECT 1", &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_closes_session() {
        let server = MockServer::new();
        let conn = MockConnection::open(server.clone());
        assert_eq!(server.live_connections(), 1);

        drop(conn);
        assert_eq!(server.live_connections(), 0);
        assert_eq!(server.connections_closed(), 1);
    }
}
