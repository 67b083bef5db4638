//! `Changeset` - one migration step pairing forward and reverse SQL

use crate::error::{Result, TernError};
use sha2::digest::Output;
use sha2::{Digest, Sha256};

/// A database changeset
///
/// Identity is the tuple `(created_at, order, setup, teardown)`. Equality and
/// `Hash` are derived over exactly those fields, so two changesets are
/// interchangeable in a set iff the tuples match.
///
/// `setup` and `teardown` are stored trimmed of surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Changeset {
    /// Unix timestamp of when the changeset was created
    created_at: i64,

    /// Position in the linear history, assigned by an adapter on apply
    order: Option<u32>,

    /// SQL that applies the change
    setup: String,

    /// SQL that reverses the change (may be empty)
    teardown: String,
}

impl Changeset {
    /// Create a new, unordered changeset stamped with the current time
    ///
    /// An empty teardown is allowed but logged: such a changeset can be
    /// reverted only in the sense that its tracking row is removed.
    pub fn new(setup: impl AsRef<str>, teardown: impl AsRef<str>) -> Self {
        let changeset = Self::from_parts(
            chrono::Utc::now().timestamp(),
            None,
            setup.as_ref(),
            teardown.as_ref(),
        );
        if changeset.teardown.is_empty() {
            log::warn!("Changeset has no teardown SQL; reverting it will not undo its setup");
        }
        changeset
    }

    /// Rebuild a changeset from stored values (a file or a tracking row)
    ///
    /// CRLF line endings are stored as LF so the hash matches what the file
    /// decodes to.
    pub fn from_parts(
        created_at: i64,
        order: Option<u32>,
        setup: impl AsRef<str>,
        teardown: impl AsRef<str>,
    ) -> Self {
        Self {
            created_at,
            order,
            setup: normalize(setup.as_ref()),
            teardown: normalize(teardown.as_ref()),
        }
    }

    #[must_use]
    pub fn with_order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }

    #[must_use]
    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn order(&self) -> Option<u32> {
        self.order
    }

    /// Assign the order. Changes the identity hash.
    pub fn set_order(&mut self, order: u32) {
        self.order = Some(order);
    }

    pub fn is_ordered(&self) -> bool {
        self.order.is_some()
    }

    pub fn setup(&self) -> &str {
        &self.setup
    }

    pub fn teardown(&self) -> &str {
        &self.teardown
    }

    /// SHA-256 identity hash as raw bytes
    ///
    /// # Errors
    ///
    /// Returns `TernError::Unordered` until an order has been assigned: a hash
    /// computed before that point would not match the one the changeset is
    /// stored under.
    pub fn hash(&self) -> Result<[u8; 32]> {
        self.require_order()?;
        Ok(self.digest().into())
    }

    /// SHA-256 identity hash as lowercase hex; used as tracking key and file name
    ///
    /// # Errors
    ///
    /// Returns `TernError::Unordered` until an order has been assigned.
    pub fn hex_hash(&self) -> Result<String> {
        self.require_order()?;
        Ok(format!("{:x}", self.digest()))
    }

    /// Digest bytes regardless of order, for deterministic sorting only
    pub(crate) fn sort_key(&self) -> [u8; 32] {
        self.digest().into()
    }

    fn require_order(&self) -> Result<u32> {
        self.order.ok_or(TernError::Unordered)
    }

    // Every field is framed (fixed width or length-prefixed) so that distinct
    // tuples never produce the same digest input.
    fn digest(&self) -> Output<Sha256> {
        let mut hasher = Sha256::new();
        hasher.update(self.created_at.to_be_bytes());
        match self.order {
            Some(order) => {
                hasher.update([1u8]);
                hasher.update(order.to_be_bytes());
            }
            None => hasher.update([0u8]),
        }
        for text in [&self.setup, &self.teardown] {
            hasher.update((text.len() as u64).to_be_bytes());
            hasher.update(text.as_bytes());
        }
        hasher.finalize()
    }
}

fn normalize(sql: &str) -> String {
    sql.replace("\r\n", "\n").trim().to_string()
}
