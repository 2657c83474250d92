//! Error types for the PromptMerge core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

/// Errors from the merge engine, conflict resolver and merge workflow.
///
/// Detected conflicts are *not* an error: they are reported through
/// [`MergeResult::has_conflicts`](crate::conflict::MergeResult) and
/// [`MergeOutcome::Conflicts`](crate::merge_workflow::MergeOutcome).
#[derive(Debug, Error)]
pub enum MergeError {
    /// Content submitted as resolved still contains conflict markers.
    #[error("merged content still contains unresolved conflict markers")]
    ConflictsUnresolved,

    /// One of the three merge inputs was absent.
    #[error("merge input '{side}' is missing")]
    MissingInput { side: &'static str },

    /// A conflict's recorded marker span no longer brackets a marker block.
    #[error("conflict {id}: marker span {start}..={end} does not match the content")]
    MarkerSpanMismatch { id: String, start: usize, end: usize },

    /// A resolved conflict has no marker block left to replace.
    #[error("conflict {0}: no marker block found in the content")]
    MarkerBlockNotFound(String),

    /// A text exceeds the configured size limit.
    #[error("{side} content is {len} bytes, limit is {max}")]
    ContentTooLarge {
        side: &'static str,
        len: usize,
        max: usize,
    },

    /// The merge request is missing a required field.
    #[error("invalid merge request: {0}")]
    InvalidRequest(String),

    /// The source branch has no commits to merge.
    #[error("source branch '{0}' has no commits to merge")]
    SourceHasNoCommits(String),

    /// Source and target are the same branch.
    #[error("cannot merge branch '{0}' into itself")]
    SameBranch(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading or writing the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A uniqueness constraint would be violated.
    #[error("{entity} already exists: {name}")]
    AlreadyExists { entity: String, name: String },

    /// The operation is not allowed in the current state.
    #[error("{0}")]
    InvalidOperation(String),

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DatabaseError {
    pub(crate) fn not_found(entity: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }
}
