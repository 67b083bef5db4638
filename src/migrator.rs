//! Tern - changeset orchestration
//!
//! `Tern` ties one [`Adapter`] to one changeset directory. Every operation
//! opens a [`Session`] on the adapter and closes it before returning, so a
//! `Tern` never holds a connection between calls.
//!
//! The database is always written before the directory. If the file write
//! fails after a commit, the error says so; nothing is retried or rolled back.

use crate::adapter::{Adapter, Session};
use crate::changeset::Changeset;
use crate::codec;
use crate::error::{Result, TernError};
use crate::reconcile::{self, Diff};
use std::path::{Path, PathBuf};

pub struct Tern<A: Adapter> {
    adapter: A,
    directory: PathBuf,
}

impl<A: Adapter> Tern<A> {
    /// Bind `adapter` to the changeset `directory`
    ///
    /// # Errors
    ///
    /// Returns `TernError::NotInitialized` if the tracking table does not
    /// exist, or the adapter's error if it cannot connect.
    pub fn new(mut adapter: A, directory: impl AsRef<Path>) -> Result<Self> {
        Session::open(&mut adapter)?.verify_initialized()?;
        Ok(Self {
            adapter,
            directory: directory.as_ref().to_path_buf(),
        })
    }

    /// Create the tracking table for `adapter`
    ///
    /// # Errors
    ///
    /// Returns `TernError::AlreadyInitialized` if the table already exists.
    pub fn initialize(adapter: &mut A) -> Result<()> {
        let mut session = Session::open(adapter)?;
        if session.is_initialized()? {
            return Err(TernError::AlreadyInitialized {
                table: session.table().to_string(),
            });
        }
        session.initialize_tracking()?;
        session.verify_initialized()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn into_adapter(self) -> A {
        self.adapter
    }

    /// Run a changeset's setup and teardown in a rolled-back transaction
    pub fn test(&mut self, changeset: &Changeset) -> Result<()> {
        Session::open(&mut self.adapter)?.test(changeset)
    }

    /// Apply `changeset` and save it into the directory
    ///
    /// An unordered changeset receives its order here; the file is named by
    /// the resulting hash. Returns the path of the written file.
    ///
    /// # Errors
    ///
    /// Adapter errors leave both the database and the directory untouched.
    /// `TernError::FileWriteAfterCommit` means the database has the changeset
    /// but the directory does not.
    pub fn apply(&mut self, changeset: &mut Changeset) -> Result<PathBuf> {
        // Refuse before committing anything that could not be saved as a file
        codec::check_encodable(changeset)?;
        Session::open(&mut self.adapter)?.apply(changeset)?;

        let hash = changeset.hex_hash()?;
        log::info!("Applied changeset {hash}");
        codec::write_file(&self.directory, changeset).map_err(|e| match e {
            TernError::Io(source) => TernError::FileWriteAfterCommit { hash, source },
            other => other,
        })
    }

    /// Revert `changeset` and delete its file
    ///
    /// Returns whether a file was removed; a missing file is not an error.
    pub fn revert(&mut self, changeset: &Changeset) -> Result<bool> {
        Session::open(&mut self.adapter)?.revert(changeset)?;

        log::info!("Reverted changeset {}", changeset.hex_hash()?);
        codec::remove_file(&self.directory, changeset)
    }

    /// The applied changeset whose hex hash is `hash`
    ///
    /// # Errors
    ///
    /// Returns `TernError::MissingRecord` if no such changeset is applied.
    pub fn find_applied(&mut self, hash: &str) -> Result<Changeset> {
        let applied = Session::open(&mut self.adapter)?.get_applied()?;
        for changeset in applied {
            if changeset.hex_hash()? == hash {
                return Ok(changeset);
            }
        }
        Err(TernError::MissingRecord { hash: hash.to_string() })
    }

    /// Compare the applied changesets with the directory
    pub fn diff(&mut self) -> Result<Diff> {
        let applied = Session::open(&mut self.adapter)?.get_applied()?;
        let saved = codec::load_directory(&self.directory)?;
        Ok(reconcile::diff(&applied, &saved))
    }

    /// Bring the database in line with the directory
    ///
    /// Reverts every changeset missing from the directory (highest order
    /// first), then applies every changeset missing from the database (lowest
    /// order first), all over one connection. Directory files are left as
    /// they are. Returns the diff that was acted on.
    ///
    /// Stops at the first failure; changesets processed before it stay done.
    pub fn update(&mut self) -> Result<Diff> {
        let mut session = Session::open(&mut self.adapter)?;
        let applied = session.get_applied()?;
        let saved = codec::load_directory(&self.directory)?;
        let diff = reconcile::diff(&applied, &saved);

        for changeset in &diff.to_teardown {
            session.revert(changeset)?;
            log::info!("Reverted changeset {}", changeset.hex_hash()?);
        }
        for changeset in &diff.to_apply {
            let mut changeset = changeset.clone();
            session.apply(&mut changeset)?;
            log::info!("Applied changeset {}", changeset.hex_hash()?);
        }
        Ok(diff)
    }

    /// Changeset files whose names do not match their content hash
    pub fn validate(&self) -> Result<Vec<PathBuf>> {
        let mut mismatched = Vec::new();
        for (path, changeset) in codec::scan_directory(&self.directory)? {
            if !codec::file_name_matches(&path, &changeset)? {
                mismatched.push(path);
            }
        }
        Ok(mismatched)
    }
}
