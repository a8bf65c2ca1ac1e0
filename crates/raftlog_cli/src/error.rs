//! CLI error type.

use raftlog_core::JournalError;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Journal operation failed.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// I/O error outside the journal.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No segment files with the given name.
    #[error("no journal named '{name}' found at {}", path.display())]
    NoJournal {
        /// Directory searched.
        path: PathBuf,
        /// Journal name searched for.
        name: String,
    },

    /// Verification found problems.
    #[error("verification failed with {problems} problem(s)")]
    VerificationFailed {
        /// Number of problems found.
        problems: usize,
    },
}
