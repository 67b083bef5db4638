//! Printable steps for `diff` and `update`

use std::fmt;
use tern::{Changeset, Diff};

/// Hash prefix shown in listings
pub const SHORT_HASH_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Revert,
    Apply,
}

/// One changeset that `update` reverts or applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    pub hash: String,
    pub order: Option<u32>,
    /// First non-blank line of the SQL the step runs
    pub headline: String,
}

impl Step {
    fn new(action: Action, changeset: &Changeset) -> tern::Result<Self> {
        let sql = match action {
            Action::Revert => changeset.teardown(),
            Action::Apply => changeset.setup(),
        };
        let headline = sql
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("(no SQL)")
            .to_string();
        Ok(Self {
            action,
            hash: changeset.hex_hash()?,
            order: changeset.order(),
            headline,
        })
    }

    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(SHORT_HASH_LEN)]
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.action {
            Action::Revert => "revert",
            Action::Apply => "apply",
        };
        write!(f, "{verb:<6} {}", self.short_hash())?;
        if let Some(order) = self.order {
            write!(f, " (order {order})")?;
        }
        write!(f, ": {}", self.headline)
    }
}

/// Steps in execution order: reverts first, then applies
pub fn plan(diff: &Diff) -> tern::Result<Vec<Step>> {
    let reverts = diff.to_teardown.iter().map(|c| Step::new(Action::Revert, c));
    let applies = diff.to_apply.iter().map(|c| Step::new(Action::Apply, c));
    reverts.chain(applies).collect()
}
