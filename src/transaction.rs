//! PostgreSQL transaction guard
//!
//! A `Transaction` issues `BEGIN` on creation and must be finished with
//! `commit()` or `rollback()`. If it is dropped while still open (an early `?`
//! return, a panic) it issues `ROLLBACK`, so a failed changeset never leaves
//! partial effects behind.

use crate::error::Result;
use may_postgres::types::ToSql;
use may_postgres::{Client, Row};

pub struct Transaction<'a> {
    client: &'a Client,
    closed: bool,
}

impl<'a> Transaction<'a> {
    /// Start a transaction on `client`
    pub fn begin(client: &'a Client) -> Result<Self> {
        client.execute("BEGIN", &[])?;
        Ok(Self { client, closed: false })
    }

    /// Run a multi-statement script (no parameters)
    pub fn batch_execute(&self, script: &str) -> Result<()> {
        log::debug!("Executing script ({} bytes)", script.len());
        self.client.batch_execute(script)?;
        Ok(())
    }

    /// Execute one parameterized statement, returning the rows affected
    pub fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64> {
        Ok(self.client.execute(query, params)?)
    }

    pub fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row> {
        Ok(self.client.query_one(query, params)?)
    }

    /// Commit; the transaction is closed afterwards
    pub fn commit(mut self) -> Result<()> {
        self.closed = true;
        self.client.execute("COMMIT", &[])?;
        Ok(())
    }

    /// Roll back; the transaction is closed afterwards
    pub fn rollback(mut self) -> Result<()> {
        self.closed = true;
        self.client.execute("ROLLBACK", &[])?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.client.execute("ROLLBACK", &[]) {
                log::warn!("Failed to roll back abandoned transaction: {e}");
            }
        }
    }
}
