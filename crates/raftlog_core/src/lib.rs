//! # raftlog Core
//!
//! A crash-safe, append-only journal for replicated state machine entries.
//!
//! This crate provides:
//! - Segment files with a fixed 64-byte descriptor and checksummed entries
//! - A sparse per-segment index for seeking to an entry
//! - [`SegmentedJournal`] with one [`EntryWriter`] and many [`EntryReader`]s
//! - Segment rollover, compaction, and truncation back to any uncommitted index
//! - Disk and memory-mapped storage levels from `raftlog_storage`
//!
//! ## Crash Recovery
//!
//! Opening a journal scans every segment. The first position in a segment
//! that does not hold a valid entry ends that segment, so a write torn by a
//! crash is dropped. Segments that do not continue the index chain of their
//! predecessor are deleted along with everything after them.
//!
//! ## Example
//!
//! ```rust
//! use raftlog_core::{BytesMapper, JournalConfig, SegmentedJournal, StorageLevel};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = JournalConfig::new()
//!     .name("raft")
//!     .directory(dir.path())
//!     .storage_level(StorageLevel::Mapped)
//!     .max_segment_size(64 * 1024);
//! let journal = SegmentedJournal::open(config).unwrap();
//!
//! let mut writer = journal.writer().unwrap();
//! writer.append(&BytesMapper, &b"set x = 1"[..]).unwrap();
//! writer.commit(1).unwrap();
//!
//! let mut reader = journal.open_commits_reader(1).unwrap();
//! assert_eq!(reader.next(&BytesMapper).unwrap().unwrap(), b"set x = 1");
//! assert!(reader.next(&BytesMapper).unwrap().is_none());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
mod journal;
mod mapper;
pub mod segment;

pub use config::{
    JournalConfig, DEFAULT_INDEX_DENSITY, DEFAULT_MAX_ENTRIES_PER_SEGMENT, DEFAULT_MAX_ENTRY_SIZE,
    DEFAULT_MAX_SEGMENT_SIZE, DEFAULT_NAME,
};
pub use dir::{list_segment_files, JournalDir};
pub use error::{JournalError, JournalResult};
pub use journal::{EntryReader, EntryWriter, SegmentedJournal};
pub use mapper::{BytesMapper, CborMapper, FromBytesMapper, Indexed, ToBytesMapper};
pub use segment::{SegmentDescriptor, SegmentFile, SegmentInfo};

pub use raftlog_storage::StorageLevel;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
