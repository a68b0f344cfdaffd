//! Error types for recommender-core operations.

use std::path::PathBuf;
use std::time::Duration;

/// All errors that can occur in recommender-core operations.
///
/// Advisory reads (loading the model, reading lock metadata) never produce
/// these; they degrade to "absent". Only conditions a caller must react to
/// are surfaced.
#[derive(Debug, thiserror::Error)]
pub enum RecommenderError {
    // ─────────────────────────────────────────────────────────────────────
    // Locking
    // ─────────────────────────────────────────────────────────────────────
    #[error("Unable to acquire a lock to modify the recommendation model: {path} (waited {waited:?})")]
    LockTimeout { path: PathBuf, waited: Duration },

    // ─────────────────────────────────────────────────────────────────────
    // Storage
    // ─────────────────────────────────────────────────────────────────────
    #[error("No storage directory could be resolved for this platform")]
    StorageDirUnavailable,

    #[error("Invalid auxiliary key: {0:?}")]
    InvalidKey(String),

    // ─────────────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration write failed: {path}: {source}")]
    ConfigWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────
    /// Raised by a caller's `run_with_lock` closure; the store only passes it
    /// through. Host failures use [`InstallFailed`](Self::InstallFailed).
    #[error("Model mutation failed: {0}")]
    Mutation(String),

    // ─────────────────────────────────────────────────────────────────────
    // Host
    // ─────────────────────────────────────────────────────────────────────
    #[error("Installing {extension_id} failed: {details}")]
    InstallFailed {
        extension_id: String,
        details: String,
    },

    // ─────────────────────────────────────────────────────────────────────
    // I/O
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RecommenderError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RecommenderError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using RecommenderError.
pub type Result<T> = std::result::Result<T, RecommenderError>;

impl From<RecommenderError> for String {
    fn from(err: RecommenderError) -> String {
        err.to_string()
    }
}
