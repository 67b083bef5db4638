//! Reconciliation between the applied set (database) and the saved set (directory)

use crate::changeset::Changeset;
use std::cmp::Reverse;
use std::collections::HashSet;

/// What it takes to bring the database in sync with the changeset directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Applied but no longer saved; newest first
    pub to_teardown: Vec<Changeset>,

    /// Saved but not applied; oldest first
    pub to_apply: Vec<Changeset>,
}

impl Diff {
    /// Neither list has entries
    #[must_use]
    pub fn is_in_sync(&self) -> bool {
        self.to_teardown.is_empty() && self.to_apply.is_empty()
    }

    /// Total number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_teardown.len() + self.to_apply.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_in_sync()
    }
}

/// Compute the teardown and apply lists
///
/// Membership is full structural equality, so a changeset edited on disk shows
/// up once in each list. `to_teardown` is sorted by order descending and
/// `to_apply` by order ascending. Changesets sharing an order are sorted by
/// identity digest, ascending, in both lists; an unordered changeset counts as
/// lower than any ordered one.
pub fn diff(applied: &HashSet<Changeset>, saved: &HashSet<Changeset>) -> Diff {
    let mut to_teardown: Vec<Changeset> = applied.difference(saved).cloned().collect();
    let mut to_apply: Vec<Changeset> = saved.difference(applied).cloned().collect();

    to_teardown.sort_by_cached_key(|c| (Reverse(c.order()), c.sort_key()));
    to_apply.sort_by_cached_key(|c| (c.order(), c.sort_key()));

    Diff { to_teardown, to_apply }
}
