//! # raftlog Storage
//!
//! Segment file access for raftlog.
//!
//! This crate provides the lowest-level I/O layer of the journal. It knows
//! nothing about descriptors, entries or indexes: it exposes bounded,
//! positional reads and writes over one segment file and leaves every byte
//! of interpretation to `raftlog_core`.
//!
//! ## Design Principles
//!
//! - Access is bounded by the segment's maximum size
//! - Bytes are borrowed through closures, never copied out by the back-end
//! - Readers are independent; a segment has at most one writer
//! - Truncation (zeroing) is visible to every reader of the file
//!
//! ## Storage Levels
//!
//! - [`StorageLevel::Disk`] - buffered positional I/O through [`DiskFileAccess`]
//! - [`StorageLevel::Mapped`] - the file is mapped whole through [`MappedFileAccess`]
//!
//! ## Example
//!
//! ```rust
//! use parking_lot::Mutex;
//! use raftlog_storage::{FileAccess, StorageLevel};
//! use std::sync::Arc;
//!
//! let file = tempfile::tempfile().unwrap();
//! let access = FileAccess::open(StorageLevel::Disk, Arc::new(Mutex::new(file)), 4096, 256).unwrap();
//!
//! let mut writer = access.writer();
//! writer.write(0, 5, |buf| {
//!     buf.copy_from_slice(b"hello");
//!     Some(5)
//! }).unwrap();
//!
//! let mut reader = access.reader();
//! let data = reader.read(0, 5, <[u8]>::to_vec).unwrap();
//! assert_eq!(&data, b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
mod disk;
mod error;
mod level;
mod mapped;

pub use access::{choose_buffer_size, FileAccess, FileReader, FileWriter, MIN_IO_SIZE};
pub use disk::{DiskFileAccess, DiskFileReader, DiskFileWriter};
pub use error::{StorageError, StorageResult};
pub use level::StorageLevel;
pub use mapped::{MappedFileAccess, MappedFileReader, MappedFileWriter};
