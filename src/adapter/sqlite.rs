//! SQLite backend, the reference adapter
//!
//! `host` is the path of the database file (`:memory:` works, but an in-memory
//! database does not survive `close`). SQLite has no database name or
//! credentials, so those settings are rejected.

use crate::adapter::tracking::{self, Dialect, TrackingSql};
use crate::adapter::Adapter;
use crate::changeset::Changeset;
use crate::config::AdapterConfig;
use crate::error::{Result, TernError};
use rusqlite::{params, Connection};
use std::collections::HashSet;

pub struct SqliteAdapter {
    path: String,
    sql: TrackingSql,
    conn: Option<Connection>,
}

impl SqliteAdapter {
    /// Create an adapter for the database file at `path`; does not connect yet
    pub fn new(path: impl Into<String>, table: &str) -> Result<Self> {
        Ok(Self {
            path: path.into(),
            sql: TrackingSql::new(table, Dialect::Sqlite)?,
            conn: None,
        })
    }

    /// Build from configuration; only `host` and `table` are meaningful
    pub fn from_config(config: &AdapterConfig) -> Result<Self> {
        for (name, value) in [
            ("dbname", &config.dbname),
            ("username", &config.username),
            ("password", &config.password),
            ("url", &config.url),
        ] {
            if value.as_deref().is_some_and(|v| !v.is_empty()) {
                return Err(TernError::Config(format!("`{name}` is not supported by the sqlite adapter")));
            }
        }
        let path = config
            .host
            .clone()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TernError::Config("the sqlite adapter needs `host` set to a database file".to_string()))?;
        Self::new(path, &config.table)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The open connection, if any
    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }
}

fn is_recorded(conn: &Connection, sql: &TrackingSql, hash: &str) -> Result<bool> {
    let count: i64 = conn.query_row(&sql.count_by_hash, params![hash], |row| row.get(0))?;
    Ok(count > 0)
}

impl Adapter for SqliteAdapter {
    fn open(&mut self) -> Result<()> {
        if self.conn.is_none() {
            log::debug!("Opening sqlite database {}", self.path);
            self.conn = Some(Connection::open(&self.path)?);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| TernError::from(e))?;
        }
        Ok(())
    }

    fn table(&self) -> &str {
        &self.sql.table
    }

    fn initialize_tracking(&mut self) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(TernError::NotConnected)?;
        conn.execute_batch(&self.sql.create_table)?;
        log::info!("Created tracking table '{}'", self.sql.table);
        Ok(())
    }

    fn is_initialized(&mut self) -> Result<bool> {
        let conn = self.conn.as_ref().ok_or(TernError::NotConnected)?;
        let count: i64 = conn.query_row(&self.sql.table_exists, params![self.sql.table], |row| row.get(0))?;
        Ok(count > 0)
    }

    fn apply(&mut self, changeset: &mut Changeset) -> Result<()> {
        if changeset.setup().is_empty() {
            return Err(TernError::EmptySetup);
        }
        let conn = self.conn.as_mut().ok_or(TernError::NotConnected)?;

        let order = match changeset.order() {
            Some(order) => order,
            None => {
                let max: Option<i64> = conn.query_row(&self.sql.max_order, [], |row| row.get(0))?;
                tracking::next_order(max)?
            }
        };
        let candidate = changeset.clone().with_order(order);
        let hash = candidate.hex_hash()?;
        if is_recorded(conn, &self.sql, &hash)? {
            return Err(TernError::DuplicateApply { hash });
        }

        // Dropping an uncommitted transaction rolls it back
        let tx = conn.transaction()?;
        tx.execute_batch(candidate.setup())?;
        tx.execute(
            &self.sql.insert,
            params![hash, candidate.created_at(), candidate.setup(), candidate.teardown(), order],
        )?;
        tx.commit()?;

        changeset.set_order(order);
        log::debug!("Applied changeset {hash} (order {order})");
        Ok(())
    }

    fn revert(&mut self, changeset: &Changeset) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(TernError::NotConnected)?;
        let hash = changeset.hex_hash()?;
        if !is_recorded(conn, &self.sql, &hash)? {
            return Err(TernError::MissingRecord { hash });
        }

        let tx = conn.transaction()?;
        if !changeset.teardown().is_empty() {
            tx.execute_batch(changeset.teardown())?;
        }
        tx.execute(&self.sql.delete, params![hash])?;
        tx.commit()?;

        log::debug!("Reverted changeset {hash}");
        Ok(())
    }

    fn test(&mut self, changeset: &Changeset) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(TernError::NotConnected)?;

        let tx = conn.transaction()?;
        let outcome = tx.execute_batch(changeset.setup()).and_then(|()| {
            if changeset.teardown().is_empty() {
                Ok(())
            } else {
                tx.execute_batch(changeset.teardown())
            }
        });
        let rollback = tx.rollback();

        outcome?;
        rollback?;
        Ok(())
    }

    fn get_applied(&mut self) -> Result<HashSet<Changeset>> {
        let conn = self.conn.as_ref().ok_or(TernError::NotConnected)?;
        let mut stmt = conn.prepare(&self.sql.select_all)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut applied = HashSet::new();
        for row in rows {
            let (created_at, order, setup, teardown) = row?;
            let order = tracking::stored_order(order)?;
            applied.insert(Changeset::from_parts(created_at, Some(order), setup, teardown));
        }
        Ok(applied)
    }
}
