//! Error types shared by every tern component

use thiserror::Error;

/// Result alias used throughout tern
pub type Result<T, E = TernError> = std::result::Result<T, E>;

/// Boxed driver error, kept intact so callers can downcast to the backend's own type
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by changesets, the codec, adapters and the orchestrator
#[derive(Debug, Error)]
pub enum TernError {
    /// The tracking table is missing from the target database
    #[error("tracking table '{table}' does not exist; run `tern init` first")]
    NotInitialized { table: String },

    /// `tern init` was run against a database that already has a tracking table
    #[error("tracking table '{table}' already exists")]
    AlreadyInitialized { table: String },

    /// A changeset file is missing a required marker or has an unreadable value
    #[error("invalid changeset file: {0}")]
    InvalidChangesetFile(String),

    /// A row with this hash is already tracked
    #[error("changeset {hash} has already been applied")]
    DuplicateApply { hash: String },

    /// No row with this hash is tracked
    #[error("changeset {hash} has not been applied")]
    MissingRecord { hash: String },

    /// The changeset has no order, so its identity hash is not final
    #[error("changeset has no order yet; its identity hash is not final")]
    Unordered,

    /// Setup SQL is empty; there is nothing to apply
    #[error("changeset setup SQL is empty")]
    EmptySetup,

    /// An operation was attempted on an adapter whose connection is not open
    #[error("adapter connection is not open")]
    NotConnected,

    /// An order value does not fit the tracking table's integer column
    #[error("order {0} does not fit the tracking table's order column")]
    OrderOutOfRange(i64),

    /// Tracking table names are restricted to plain SQL identifiers
    #[error("invalid tracking table name '{0}': expected letters, digits and underscores")]
    InvalidTableName(String),

    /// No factory is registered under the configured backend name
    #[error("no adapter registered under '{0}'")]
    UnknownAdapter(String),

    /// A factory is already registered under this backend name
    #[error("an adapter is already registered under '{0}'")]
    AdapterAlreadyRegistered(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    /// The database commit succeeded but the changeset file was not written.
    ///
    /// The database and the changeset directory have drifted apart; nothing is
    /// rolled back or retried.
    #[error(
        "changeset {hash} was applied to the database but its file could not be written: {source}\n\
         The database and the changeset directory are now out of sync."
    )]
    FileWriteAfterCommit {
        hash: String,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Error raised by the database driver, propagated as-is
    #[error(transparent)]
    Backend(BackendError),
}

impl From<config::ConfigError> for TernError {
    fn from(error: config::ConfigError) -> Self {
        TernError::Config(error.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<may_postgres::Error> for TernError {
    fn from(error: may_postgres::Error) -> Self {
        TernError::Backend(Box::new(error))
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for TernError {
    fn from(error: rusqlite::Error) -> Self {
        TernError::Backend(Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_initialized_names_table() {
        let err = TernError::NotInitialized { table: "tern".to_string() };
        assert!(err.to_string().contains("'tern'"));
        assert!(err.to_string().contains("tern init"));
    }

    #[test]
    fn test_guard_errors_carry_hash() {
        let dup = TernError::DuplicateApply { hash: "abc".to_string() };
        assert!(dup.to_string().contains("abc"));
        assert!(dup.to_string().contains("already been applied"));

        let missing = TernError::MissingRecord { hash: "def".to_string() };
        assert!(missing.to_string().contains("def"));
        assert!(missing.to_string().contains("not been applied"));
    }

    #[test]
    fn test_backend_error_is_transparent() {
        let err = TernError::Backend("syntax error at or near \"craete\"".into());
        assert_eq!(err.to_string(), "syntax error at or near \"craete\"");
    }

    #[test]
    fn test_file_write_after_commit_keeps_source() {
        use std::error::Error as _;

        let err = TernError::FileWriteAfterCommit {
            hash: "abc".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("out of sync"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: TernError = config::ConfigError::Message("missing directory".to_string()).into();
        assert!(matches!(err, TernError::Config(ref msg) if msg.contains("missing directory")));
    }
}
