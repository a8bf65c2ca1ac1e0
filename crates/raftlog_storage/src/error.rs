//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An access would cross the end of the segment.
    #[error("access out of segment bounds: position {position}, size {size}, limit {limit}")]
    OutOfBounds {
        /// The requested position.
        position: usize,
        /// The requested size.
        size: usize,
        /// The maximum segment size.
        limit: usize,
    },

    /// A write callback reported more bytes than it was given.
    #[error("write overflow: {written} bytes committed into a {capacity} byte window")]
    WriteOverflow {
        /// Bytes the callback claimed to have written.
        written: usize,
        /// Size of the window handed to the callback.
        capacity: usize,
    },
}

/// Checks that `[position, position + size)` lies inside `[0, limit)`.
pub(crate) fn check_bounds(position: usize, size: usize, limit: usize) -> StorageResult<()> {
    match position.checked_add(size) {
        Some(end) if end <= limit => Ok(()),
        _ => Err(StorageError::OutOfBounds {
            position,
            size,
            limit,
        }),
    }
}
