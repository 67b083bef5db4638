//! Storage adapters
//!
//! An adapter owns the connection to one target database and knows how to:
//! - open and close that connection
//! - create and detect the tracking table
//! - apply, revert and dry-run (`test`) a changeset atomically
//! - list the changesets recorded as applied
//!
//! Backends are selected by name through [`registry`].

use crate::changeset::Changeset;
use crate::error::{Result, TernError};
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};

pub mod registry;
pub mod tracking;

#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use registry::{create_adapter, register_adapter, registered_adapters, AdapterFactory};

/// Capability set every storage backend implements
///
/// Per changeset hash, a backend has two states: unrecorded and recorded.
/// `apply` moves unrecorded to recorded, `revert` the other way; `apply` on a
/// recorded hash and `revert` on an unrecorded one fail.
pub trait Adapter {
    /// Open the connection. Prefer [`Session::open`], which also closes it.
    fn open(&mut self) -> Result<()>;

    /// Close the connection; a no-op if it is not open
    fn close(&mut self) -> Result<()>;

    /// Name of the tracking table
    fn table(&self) -> &str;

    /// Create the tracking table
    ///
    /// # Errors
    ///
    /// Fails with the backend's own error if the table already exists.
    fn initialize_tracking(&mut self) -> Result<()>;

    /// Whether the tracking table exists
    fn is_initialized(&mut self) -> Result<bool>;

    /// Fail with `TernError::NotInitialized` if the tracking table is missing
    fn verify_initialized(&mut self) -> Result<()> {
        if self.is_initialized()? {
            Ok(())
        } else {
            Err(TernError::NotInitialized {
                table: self.table().to_string(),
            })
        }
    }

    /// Execute `setup` and record the changeset, in one transaction
    ///
    /// An unordered changeset gets `max(order) + 1`, or `1` for an empty
    /// tracking table; the order is written back to `changeset` once the
    /// transaction commits.
    ///
    /// # Errors
    ///
    /// - `TernError::EmptySetup` if there is no setup SQL
    /// - `TernError::DuplicateApply` if the hash is already tracked
    /// - the backend's error, unchanged, if execution fails (nothing is kept)
    fn apply(&mut self, changeset: &mut Changeset) -> Result<()>;

    /// Execute `teardown` (if any) and delete the record, in one transaction
    ///
    /// # Errors
    ///
    /// - `TernError::MissingRecord` if the hash is not tracked
    /// - the backend's error, unchanged, if execution fails
    fn revert(&mut self, changeset: &Changeset) -> Result<()>;

    /// Execute `setup` then `teardown` inside a transaction that is always
    /// rolled back. Execution errors surface after the rollback.
    fn test(&mut self, changeset: &Changeset) -> Result<()>;

    /// Every recorded changeset, with its stored order
    fn get_applied(&mut self) -> Result<HashSet<Changeset>>;
}

impl<A: Adapter + ?Sized> Adapter for Box<A> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn table(&self) -> &str {
        (**self).table()
    }

    fn initialize_tracking(&mut self) -> Result<()> {
        (**self).initialize_tracking()
    }

    fn is_initialized(&mut self) -> Result<bool> {
        (**self).is_initialized()
    }

    fn verify_initialized(&mut self) -> Result<()> {
        (**self).verify_initialized()
    }

    fn apply(&mut self, changeset: &mut Changeset) -> Result<()> {
        (**self).apply(changeset)
    }

    fn revert(&mut self, changeset: &Changeset) -> Result<()> {
        (**self).revert(changeset)
    }

    fn test(&mut self, changeset: &Changeset) -> Result<()> {
        (**self).test(changeset)
    }

    fn get_applied(&mut self) -> Result<HashSet<Changeset>> {
        (**self).get_applied()
    }
}

/// An open adapter connection that is closed when dropped
///
/// Close errors during drop cannot be propagated; they are logged.
pub struct Session<'a, A: Adapter + ?Sized> {
    adapter: &'a mut A,
}

impl<'a, A: Adapter + ?Sized> Session<'a, A> {
    /// Open the adapter's connection and guard it
    pub fn open(adapter: &'a mut A) -> Result<Self> {
        adapter.open()?;
        Ok(Self { adapter })
    }
}

impl<A: Adapter + ?Sized> Deref for Session<'_, A> {
    type Target = A;

    fn deref(&self) -> &A {
        self.adapter
    }
}

impl<A: Adapter + ?Sized> DerefMut for Session<'_, A> {
    fn deref_mut(&mut self) -> &mut A {
        self.adapter
    }
}

impl<A: Adapter + ?Sized> Drop for Session<'_, A> {
    fn drop(&mut self) {
        if let Err(e) = self.adapter.close() {
            log::warn!("Failed to close connection for tracking table '{}': {e}", self.adapter.table());
        }
    }
}
