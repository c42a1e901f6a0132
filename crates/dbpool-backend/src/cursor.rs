//! Cursor over a wrapper's connection.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dbpool_core::{PooledConnection, Result};
use dbpool_driver::{Connection, Row, Value};

/// Executes statements on the wrapper's connection and buffers their rows.
///
/// Borrowing the wrapper mutably for the cursor's lifetime guarantees the
/// connection cannot be closed while a cursor is in use.
pub struct Cursor<'a> {
    conn: &'a mut PooledConnection,
    use_tz: bool,
    rows: VecDeque<Row>,
    rowcount: Option<u64>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(conn: &'a mut PooledConnection, use_tz: bool) -> Self {
        Self {
            conn,
            use_tz,
            rows: VecDeque::new(),
            rowcount: None,
        }
    }

    /// Run `sql` and return the number of rows produced or affected.
    ///
    /// Rows left over from a previous statement are dropped.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.rows.clear();
        self.rowcount = None;

        let result = self.conn.execute(sql, params).await?;
        let count = if result.rows.is_empty() {
            result.rows_affected
        } else {
            result.rows.len() as u64
        };

        self.rows = result.rows.into();
        self.rowcount = Some(count);
        Ok(count)
    }

    /// Next buffered row.
    pub fn fetch_one(&mut self) -> Option<Row> {
        let row = self.rows.pop_front()?;
        Some(self.convert(row))
    }

    /// Up to `size` buffered rows.
    pub fn fetch_many(&mut self, size: usize) -> Vec<Row> {
        let take = size.min(self.rows.len());
        let rows: Vec<Row> = self.rows.drain(..take).collect();
        rows.into_iter().map(|row| self.convert(row)).collect()
    }

    /// All remaining buffered rows.
    pub fn fetch_all(&mut self) -> Vec<Row> {
        let rows: Vec<Row> = self.rows.drain(..).collect();
        rows.into_iter().map(|row| self.convert(row)).collect()
    }

    /// Row count of the last statement, `None` before the first one.
    #[must_use]
    pub fn rowcount(&self) -> Option<u64> {
        self.rowcount
    }

    /// The connection the cursor runs on.
    pub fn connection(&mut self) -> &mut PooledConnection {
        &mut *self.conn
    }

    fn convert(&self, mut row: Row) -> Row {
        if self.use_tz {
            for value in row.values_mut() {
                if let Value::Timestamp(naive) = value {
                    *value = Value::TimestampTz(DateTime::<Utc>::from_naive_utc_and_offset(
                        *naive, Utc,
                    ));
                }
            }
        }
        row
    }
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("connection", &self.conn)
            .field("use_tz", &self.use_tz)
            .field("buffered", &self.rows.len())
            .field("rowcount", &self.rowcount)
            .finish()
    }
}
