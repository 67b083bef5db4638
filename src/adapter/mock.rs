//! In-memory adapter for tests
//!
//! Keeps tracking rows in a map and logs every script it "executes". A failure
//! marker makes any script containing it fail, which is enough to exercise the
//! all-or-nothing paths without a database.

use crate::adapter::{tracking, Adapter};
use crate::changeset::Changeset;
use crate::error::{Result, TernError};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Default)]
pub struct MockAdapter {
    table: String,
    open: bool,
    initialized: bool,
    rows: BTreeMap<String, Changeset>,
    executed: Vec<String>,
    fail_marker: Option<String>,
}

impl MockAdapter {
    /// A mock without a tracking table
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// A mock whose tracking table already exists
    pub fn initialized(table: impl Into<String>) -> Self {
        Self {
            initialized: true,
            ..Self::new(table)
        }
    }

    /// Fail any script that contains `marker`
    #[must_use]
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Scripts that were executed and kept (rolled-back ones are dropped)
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Tracking rows keyed by hex hash
    pub fn rows(&self) -> &BTreeMap<String, Changeset> {
        &self.rows
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.open {
            return Err(TernError::NotConnected);
        }
        if !self.initialized {
            return Err(TernError::NotInitialized { table: self.table.clone() });
        }
        Ok(())
    }

    fn run(&mut self, script: &str) -> Result<()> {
        if let Some(marker) = &self.fail_marker {
            if script.contains(marker.as_str()) {
                return Err(TernError::Backend(
                    format!("mock execution failed on script containing '{marker}'").into(),
                ));
            }
        }
        self.executed.push(script.to_string());
        Ok(())
    }
}

impl Adapter for MockAdapter {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn initialize_tracking(&mut self) -> Result<()> {
        if !self.open {
            return Err(TernError::NotConnected);
        }
        if self.initialized {
            return Err(TernError::Backend(
                format!("relation \"{}\" already exists", self.table).into(),
            ));
        }
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&mut self) -> Result<bool> {
        if !self.open {
            return Err(TernError::NotConnected);
        }
        Ok(self.initialized)
    }

    fn apply(&mut self, changeset: &mut Changeset) -> Result<()> {
        self.ensure_ready()?;
        if changeset.setup().is_empty() {
            return Err(TernError::EmptySetup);
        }

        let order = match changeset.order() {
            Some(order) => order,
            None => {
                let max = self.rows.values().filter_map(Changeset::order).max();
                tracking::next_order(max.map(i64::from))?
            }
        };
        let candidate = changeset.clone().with_order(order);
        let hash = candidate.hex_hash()?;
        if self.rows.contains_key(&hash) {
            return Err(TernError::DuplicateApply { hash });
        }

        self.run(candidate.setup())?;
        self.rows.insert(hash, candidate);
        changeset.set_order(order);
        Ok(())
    }

    fn revert(&mut self, changeset: &Changeset) -> Result<()> {
        self.ensure_ready()?;
        let hash = changeset.hex_hash()?;
        if !self.rows.contains_key(&hash) {
            return Err(TernError::MissingRecord { hash });
        }

        if !changeset.teardown().is_empty() {
            self.run(changeset.teardown())?;
        }
        self.rows.remove(&hash);
        Ok(())
    }

    fn test(&mut self, changeset: &Changeset) -> Result<()> {
        self.ensure_ready()?;
        let savepoint = self.executed.len();
        let outcome = self.run(changeset.setup()).and_then(|()| {
            if changeset.teardown().is_empty() {
                Ok(())
            } else {
                self.run(changeset.teardown())
            }
        });
        self.executed.truncate(savepoint);
        outcome
    }

    fn get_applied(&mut self) -> Result<HashSet<Changeset>> {
        self.ensure_ready()?;
        Ok(self.rows.values().cloned().collect())
    }
}
