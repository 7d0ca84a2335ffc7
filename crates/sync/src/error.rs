//! Error taxonomy for sync runs.
//!
//! Every variant is scoped to the smallest failing unit (file, item or target).
//! Source-read and translation errors are downgraded to warnings by the reader
//! and adapters; the rest surface in per-target results.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A single source file is malformed or unreadable.
    #[error("Failed to read {path}: {message}")]
    SourceRead { path: PathBuf, message: String },

    /// An item cannot be represented by a target.
    #[error("Cannot translate '{item}' for {target}: {reason}")]
    Translation {
        target: String,
        item: String,
        reason: String,
    },

    /// Writing a target failed; its backup was restored.
    #[error("Write failed for target '{target}': {message}")]
    Write { target: String, message: String },

    /// Another sync holds the lock for this pair.
    #[error("Sync already in progress for {target} ({scope})")]
    LockContention { target: String, scope: String },

    /// The persisted state could not be read and was treated as empty.
    #[error("State file {path} is unreadable: {message}")]
    StateCorruption { path: PathBuf, message: String },

    #[error("Unknown target '{name}' (available: {available})")]
    TargetNotFound { name: String, available: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn source_read(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::SourceRead {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn translation(
        target: impl Into<String>,
        item: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Translation {
            target: target.into(),
            item: item.into(),
            reason: reason.into(),
        }
    }

    /// True for errors a caller should report as "busy" rather than failure.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::LockContention { .. })
    }
}
