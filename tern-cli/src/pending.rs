//! The changeset being worked on, kept in two plain SQL files

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tern::Changeset;

pub const DEFAULT_SETUP: &str = "setup.sql";
pub const DEFAULT_TEARDOWN: &str = "teardown.sql";

/// Paths of the pending setup and teardown SQL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChangeset {
    setup: PathBuf,
    teardown: PathBuf,
}

impl Default for PendingChangeset {
    fn default() -> Self {
        Self::new(DEFAULT_SETUP, DEFAULT_TEARDOWN)
    }
}

impl PendingChangeset {
    pub fn new(setup: impl AsRef<Path>, teardown: impl AsRef<Path>) -> Self {
        Self {
            setup: setup.as_ref().to_path_buf(),
            teardown: teardown.as_ref().to_path_buf(),
        }
    }

    pub fn setup_path(&self) -> &Path {
        &self.setup
    }

    pub fn teardown_path(&self) -> &Path {
        &self.teardown
    }

    /// Build an unordered changeset from the two files
    ///
    /// Both files must exist. An empty setup file is an error; an empty
    /// teardown file is allowed (`Changeset::new` warns about it).
    pub fn load(&self) -> Result<Changeset> {
        let setup = fs::read_to_string(&self.setup)
            .with_context(|| format!("Failed to read {}", self.setup.display()))?;
        if setup.trim().is_empty() {
            bail!("{} is empty", self.setup.display());
        }

        let teardown = fs::read_to_string(&self.teardown)
            .with_context(|| format!("Failed to read {}", self.teardown.display()))?;

        Ok(Changeset::new(setup, teardown))
    }

    /// Empty both files once their changeset has been applied
    pub fn clear(&self) -> Result<()> {
        for path in [&self.setup, &self.teardown] {
            fs::write(path, "").with_context(|| format!("Failed to truncate {}", path.display()))?;
        }
        Ok(())
    }
}
