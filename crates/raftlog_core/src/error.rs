//! Error types for raftlog core.

use std::io;
use thiserror::Error;

/// Result type for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// Errors that can occur in journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Storage back-end error.
    #[error("storage error: {0}")]
    Storage(#[from] raftlog_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A configuration value is missing or out of range.
    #[error("invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        message: String,
    },

    /// A segment descriptor was shorter than its fixed size.
    #[error("segment descriptor too short: {actual} of {expected} bytes")]
    DescriptorTooShort {
        /// Bytes actually available.
        actual: usize,
        /// Bytes required.
        expected: usize,
    },

    /// Invalid segment format or version.
    #[error("invalid segment format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// An entry cannot fit even in an empty segment.
    #[error("entry at index {index} exceeds the maximum entry size of {max_entry_size} bytes")]
    EntryTooLarge {
        /// Index the entry would have been written at.
        index: u64,
        /// Configured maximum entry size.
        max_entry_size: usize,
    },

    /// A mapper produced an empty payload.
    #[error("entry at index {index} serialized to zero bytes")]
    EmptyEntry {
        /// Index the entry would have been written at.
        index: u64,
    },

    /// A writer reset targeted an index it may not move to.
    #[error("index {index} out of range: {message}")]
    IndexOutOfRange {
        /// The requested index.
        index: u64,
        /// Why the index was rejected.
        message: String,
    },

    /// Not enough disk space to allocate a new segment.
    #[error("storage exhausted: {available} bytes available, {required} required")]
    StorageExhausted {
        /// Bytes required before a segment may be created.
        required: u64,
        /// Bytes currently available.
        available: u64,
    },

    /// Another process holds the journal lock.
    #[error("journal locked: another process has exclusive access")]
    JournalLocked,

    /// The journal has been closed.
    #[error("journal is closed")]
    Closed,

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// A typed mapper failed to encode or decode an entry.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },
}

impl JournalError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an index out of range error.
    pub fn index_out_of_range(index: u64, message: impl Into<String>) -> Self {
        Self::IndexOutOfRange {
            index,
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }
}
