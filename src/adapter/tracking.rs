//! Tracking table definition and the SQL every backend runs against it

use crate::error::{Result, TernError};
use regex::Regex;
use sea_query::{Alias, ColumnDef, PostgresQueryBuilder, SqliteQueryBuilder, Table, TableCreateStatement};
use std::sync::LazyLock;

/// Default tracking table name
pub const DEFAULT_TABLE: &str = "tern";

static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("table name pattern is valid"));

/// SQL dialect of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Positional parameter placeholder (1-based)
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
        }
    }
}

/// Reject anything but a plain SQL identifier
///
/// The table name is interpolated into statements, so it is never taken from
/// configuration unchecked.
pub fn validate_table_name(table: &str) -> Result<()> {
    if TABLE_NAME.is_match(table) && table.len() <= 63 {
        Ok(())
    } else {
        Err(TernError::InvalidTableName(table.to_string()))
    }
}

/// Build the tracking table definition
///
/// Columns:
/// - `hash` (text, primary key)
/// - `created_at` (64-bit integer, not null)
/// - `setup` (text, not null)
/// - `teardown` (text, not null)
/// - `order` (integer, not null)
pub fn create_tracking_table(table: &str) -> TableCreateStatement {
    Table::create()
        .table(Alias::new(table.to_string()))
        .col(ColumnDef::new("hash").text().not_null().primary_key())
        .col(ColumnDef::new("created_at").big_integer().not_null())
        .col(ColumnDef::new("setup").text().not_null())
        .col(ColumnDef::new("teardown").text().not_null())
        .col(ColumnDef::new("order").integer().not_null())
        .to_owned()
}

/// Pre-rendered statements for one tracking table in one dialect
#[derive(Debug, Clone)]
pub struct TrackingSql {
    pub table: String,
    /// `CREATE TABLE` for the tracking table
    pub create_table: String,
    /// Count of tables named `$1` visible to the connection
    pub table_exists: String,
    /// Count of rows with hash `$1`
    pub count_by_hash: String,
    /// `MAX("order")`, NULL for an empty table
    pub max_order: String,
    /// Insert `(hash, created_at, setup, teardown, order)`
    pub insert: String,
    /// Delete the row with hash `$1`
    pub delete: String,
    /// `created_at, order, setup, teardown` of every row
    pub select_all: String,
}

impl TrackingSql {
    pub fn new(table: &str, dialect: Dialect) -> Result<Self> {
        validate_table_name(table)?;

        let definition = create_tracking_table(table);
        let create_table = match dialect {
            Dialect::Postgres => definition.build(PostgresQueryBuilder),
            Dialect::Sqlite => definition.build(SqliteQueryBuilder),
        };

        let p = |index| dialect.placeholder(index);
        let table_exists = match dialect {
            Dialect::Postgres => format!(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = {}",
                p(1)
            ),
            Dialect::Sqlite => format!(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = {}",
                p(1)
            ),
        };

        Ok(Self {
            table: table.to_string(),
            create_table,
            table_exists,
            count_by_hash: format!(r#"SELECT COUNT(*) FROM "{table}" WHERE hash = {}"#, p(1)),
            max_order: format!(r#"SELECT MAX("order") FROM "{table}""#),
            insert: format!(
                r#"INSERT INTO "{table}" (hash, created_at, setup, teardown, "order") VALUES ({}, {}, {}, {}, {})"#,
                p(1),
                p(2),
                p(3),
                p(4),
                p(5)
            ),
            delete: format!(r#"DELETE FROM "{table}" WHERE hash = {}"#, p(1)),
            select_all: format!(r#"SELECT created_at, "order", setup, teardown FROM "{table}""#),
        })
    }
}

/// Order for the next unordered changeset given the current maximum
pub fn next_order(max: Option<i64>) -> Result<u32> {
    match max {
        None => Ok(1),
        Some(max) => u32::try_from(max + 1).map_err(|_| TernError::OrderOutOfRange(max + 1)),
    }
}

/// Convert a stored order column back into a changeset order
pub fn stored_order(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| TernError::OrderOutOfRange(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_table_name() {
        for name in ["tern", "tern_changesets", "_t1", "Tern"] {
            assert!(validate_table_name(name).is_ok(), "{name}");
        }
        for name in ["", "1tern", "tern; drop table users", "tern\"", "public.tern", &"t".repeat(64)] {
            assert!(
                matches!(validate_table_name(name), Err(TernError::InvalidTableName(_))),
                "{name}"
            );
        }
    }

    #[test]
    fn test_create_table_has_all_columns() {
        for dialect in [Dialect::Postgres, Dialect::Sqlite] {
            let sql = TrackingSql::new("tern", dialect).unwrap().create_table;
            let lower = sql.to_lowercase();
            assert!(lower.starts_with("create table \"tern\""), "{sql}");
            for column in ["\"hash\"", "\"created_at\"", "\"setup\"", "\"teardown\"", "\"order\""] {
                assert!(lower.contains(column), "{column} missing from {sql}");
            }
            assert!(lower.contains("primary key"), "{sql}");
        }

        let pg = TrackingSql::new("tern", Dialect::Postgres).unwrap().create_table;
        assert!(pg.to_lowercase().contains("bigint"), "{pg}");
    }

    #[test]
    fn test_placeholders_follow_dialect() {
        let pg = TrackingSql::new("tern", Dialect::Postgres).unwrap();
        assert!(pg.insert.ends_with("VALUES ($1, $2, $3, $4, $5)"));
        assert!(pg.delete.ends_with("hash = $1"));
        assert!(pg.table_exists.contains("information_schema.tables"));

        let lite = TrackingSql::new("tern", Dialect::Sqlite).unwrap();
        assert!(lite.insert.ends_with("VALUES (?1, ?2, ?3, ?4, ?5)"));
        assert!(lite.count_by_hash.ends_with("hash = ?1"));
        assert!(lite.table_exists.contains("sqlite_master"));
    }

    #[test]
    fn test_order_column_is_quoted() {
        let sql = TrackingSql::new("tern", Dialect::Sqlite).unwrap();
        assert!(sql.max_order.contains(r#"MAX("order")"#));
        assert!(sql.select_all.contains(r#""order""#));
    }

    #[test]
    fn test_tracking_sql_rejects_bad_table() {
        assert!(TrackingSql::new("x; drop", Dialect::Postgres).is_err());
    }

    #[test]
    fn test_next_order() {
        assert_eq!(next_order(None).unwrap(), 1);
        assert_eq!(next_order(Some(5)).unwrap(), 6);
        assert!(matches!(
            next_order(Some(i64::from(u32::MAX))),
            Err(TernError::OrderOutOfRange(_))
        ));
    }

    #[test]
    fn test_stored_order() {
        assert_eq!(stored_order(7).unwrap(), 7);
        assert!(stored_order(-1).is_err());
    }
}
