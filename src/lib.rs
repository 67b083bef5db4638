//! # Tern
//!
//! Version control for SQL changesets.
//!
//! A [`Changeset`] pairs forward (`setup`) and reverse (`teardown`) SQL. Applied
//! changesets are recorded in a tracking table in the target database and
//! mirrored as one file per changeset in a directory, named by the
//! changeset's content hash. [`Tern`] keeps the two in step: it applies new
//! changesets, and diffs or updates the database against the directory.
//!
//! Backends implement [`Adapter`]; PostgreSQL (`postgres` feature) and SQLite
//! (`sqlite` feature) are built in.
//!
//! ```no_run
//! use tern::{adapter, Changeset, Tern, TernConfig};
//!
//! # fn main() -> tern::Result<()> {
//! let config = TernConfig::load(None)?;
//! let adapter = adapter::create_adapter(&config.adapter)?;
//! let mut tern = Tern::new(adapter, &config.directory)?;
//!
//! let mut changeset = Changeset::new("create table foo (id integer);", "drop table foo;");
//! tern.apply(&mut changeset)?;
//! assert!(tern.diff()?.is_in_sync());
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod changeset;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod migrator;
pub mod reconcile;
#[cfg(feature = "postgres")]
pub mod transaction;

pub use adapter::{Adapter, Session};
pub use changeset::Changeset;
pub use config::{AdapterConfig, TernConfig};
pub use error::{Result, TernError};
pub use migrator::Tern;
pub use reconcile::Diff;
