//! PostgreSQL backend over `may_postgres`
//!
//! Every mutating operation runs inside a [`Transaction`] guard, so the user
//! script and the tracking-row change commit together or not at all.

use crate::adapter::tracking::{self, Dialect, TrackingSql};
use crate::adapter::Adapter;
use crate::changeset::Changeset;
use crate::config::AdapterConfig;
use crate::connection::{self, ConnectionString};
use crate::error::{Result, TernError};
use crate::transaction::Transaction;
use may_postgres::Client;
use std::collections::HashSet;

pub struct PostgresAdapter {
    connection_string: ConnectionString,
    sql: TrackingSql,
    client: Option<Client>,
}

impl PostgresAdapter {
    /// Create an adapter for `connection_string`; does not connect yet
    pub fn new(connection_string: impl Into<String>, table: &str) -> Result<Self> {
        let connection_string = connection_string.into();
        connection::validate_connection_string(&connection_string)?;
        Ok(Self {
            connection_string,
            sql: TrackingSql::new(table, Dialect::Postgres)?,
            client: None,
        })
    }

    pub fn from_config(config: &AdapterConfig) -> Result<Self> {
        Self::new(connection::connection_string(config)?, &config.table)
    }

    fn client(&self) -> Result<&Client> {
        self.client.as_ref().ok_or(TernError::NotConnected)
    }
}

/// Tracking `order` is a 32-bit signed column
fn order_param(order: u32) -> Result<i32> {
    i32::try_from(order).map_err(|_| TernError::OrderOutOfRange(i64::from(order)))
}

fn is_recorded(tx: &Transaction<'_>, sql: &TrackingSql, hash: &str) -> Result<bool> {
    let row = tx.query_one(&sql.count_by_hash, &[&hash])?;
    let count: i64 = row.try_get(0)?;
    Ok(count > 0)
}

impl Adapter for PostgresAdapter {
    fn open(&mut self) -> Result<()> {
        if self.client.is_none() {
            log::debug!("Connecting to PostgreSQL");
            self.client = Some(connection::connect(&self.connection_string)?);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // The connection is closed when the client is dropped
        self.client.take();
        Ok(())
    }

    fn table(&self) -> &str {
        &self.sql.table
    }

    fn initialize_tracking(&mut self) -> Result<()> {
        let client = self.client()?;
        client.batch_execute(&self.sql.create_table)?;
        log::info!("Created tracking table '{}'", self.sql.table);
        Ok(())
    }

    fn is_initialized(&mut self) -> Result<bool> {
        let client = self.client()?;
        let row = client.query_one(&self.sql.table_exists, &[&self.sql.table])?;
        let count: i64 = row.try_get(0)?;
        Ok(count > 0)
    }

    fn apply(&mut self, changeset: &mut Changeset) -> Result<()> {
        if changeset.setup().is_empty() {
            return Err(TernError::EmptySetup);
        }
        let client = self.client()?;
        let tx = Transaction::begin(client)?;

        let order = match changeset.order() {
            Some(order) => order,
            None => {
                let row = tx.query_one(&self.sql.max_order, &[])?;
                let max: Option<i32> = row.try_get(0)?;
                tracking::next_order(max.map(i64::from))?
            }
        };
        let candidate = changeset.clone().with_order(order);
        let hash = candidate.hex_hash()?;
        if is_recorded(&tx, &self.sql, &hash)? {
            return Err(TernError::DuplicateApply { hash });
        }

        tx.batch_execute(candidate.setup())?;
        let created_at = candidate.created_at();
        let stored_order = order_param(order)?;
        tx.execute(
            &self.sql.insert,
            &[&hash, &created_at, &candidate.setup(), &candidate.teardown(), &stored_order],
        )?;
        tx.commit()?;

        changeset.set_order(order);
        log::debug!("Applied changeset {hash} (order {order})");
        Ok(())
    }

    fn revert(&mut self, changeset: &Changeset) -> Result<()> {
        let hash = changeset.hex_hash()?;
        let client = self.client()?;
        let tx = Transaction::begin(client)?;
        if !is_recorded(&tx, &self.sql, &hash)? {
            return Err(TernError::MissingRecord { hash });
        }

        if !changeset.teardown().is_empty() {
            tx.batch_execute(changeset.teardown())?;
        }
        tx.execute(&self.sql.delete, &[&hash])?;
        tx.commit()?;

        log::debug!("Reverted changeset {hash}");
        Ok(())
    }

    fn test(&mut self, changeset: &Changeset) -> Result<()> {
        let client = self.client()?;
        let tx = Transaction::begin(client)?;
        let outcome = tx.batch_execute(changeset.setup()).and_then(|()| {
            if changeset.teardown().is_empty() {
                Ok(())
            } else {
                tx.batch_execute(changeset.teardown())
            }
        });
        let rollback = tx.rollback();

        outcome?;
        rollback
    }

    fn get_applied(&mut self) -> Result<HashSet<Changeset>> {
        let client = self.client()?;
        let rows = client.query(&self.sql.select_all, &[])?;

        let mut applied = HashSet::with_capacity(rows.len());
        for row in rows {
            let created_at: i64 = row.try_get(0)?;
            let order: i32 = row.try_get(1)?;
            let setup: String = row.try_get(2)?;
            let teardown: String = row.try_get(3)?;
            let order = tracking::stored_order(i64::from(order))?;
            applied.insert(Changeset::from_parts(created_at, Some(order), setup, teardown));
        }
        Ok(applied)
    }
}
