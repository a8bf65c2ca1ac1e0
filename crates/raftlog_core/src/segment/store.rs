//! A segment: one file, its access back-end and its sparse index.

use super::descriptor::{SegmentDescriptor, DESCRIPTOR_BYTES};
use super::entry::{read_entry, HEADER_BYTES};
use super::file::SegmentFile;
use super::index::{Position, SegmentIndex};
use super::reader::SegmentReader;
use super::writer::SegmentWriter;
use crate::error::{JournalError, JournalResult};
use parking_lot::RwLock;
use raftlog_storage::{FileAccess, StorageLevel};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// One segment of the journal.
///
/// A segment is shared between the journal, its writer and any number of
/// readers, so it is always handled as `Arc<Segment>`. At most one
/// [`SegmentWriter`] exists per segment at a time.
pub struct Segment {
    pub(super) file: SegmentFile,
    pub(super) access: FileAccess,
    pub(super) max_entry_size: usize,
    pub(super) index: RwLock<SegmentIndex>,
    /// End of the last entry written.
    pub(super) tail: AtomicUsize,
    pub(super) writer_held: AtomicBool,
}

impl Segment {
    /// Opens `file` at `level`, scanning its entries to rebuild the index.
    ///
    /// The scan stops at the first position that does not hold a valid
    /// entry, which becomes the write position.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be mapped or read.
    pub fn open(
        file: SegmentFile,
        level: StorageLevel,
        max_entry_size: usize,
        index_density: f64,
    ) -> JournalResult<Arc<Self>> {
        let limit = file.max_size();
        let access = FileAccess::open(level, file.handle(), limit, max_entry_size + HEADER_BYTES)?;

        let mut index = SegmentIndex::new(index_density);
        let mut reader = access.reader();
        let mut next = file.descriptor().first_index();
        let mut position = DESCRIPTOR_BYTES;
        while let Some((length, ())) = read_entry(&mut reader, position, limit, max_entry_size, |_| ())? {
            index.index(next, position);
            next += 1;
            position += HEADER_BYTES + length;
        }

        debug!(
            id = file.segment_id(),
            first_index = file.descriptor().first_index(),
            entries = next - file.descriptor().first_index(),
            tail = position,
            "opened segment"
        );

        Ok(Arc::new(Self {
            file,
            access,
            max_entry_size,
            index: RwLock::new(index),
            tail: AtomicUsize::new(position),
            writer_held: AtomicBool::new(false),
        }))
    }

    /// Returns the segment id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.file.segment_id()
    }

    /// Returns the segment file.
    #[must_use]
    pub fn file(&self) -> &SegmentFile {
        &self.file
    }

    /// Returns the segment descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &SegmentDescriptor {
        self.file.descriptor()
    }

    /// Returns the storage level the segment was opened at.
    #[must_use]
    pub fn level(&self) -> StorageLevel {
        self.access.level()
    }

    /// Returns the index of the first entry this segment holds or will hold.
    #[must_use]
    pub fn first_index(&self) -> u64 {
        self.file.descriptor().first_index()
    }

    /// Returns the index of the last entry, or `first_index() - 1` if empty.
    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.index
            .read()
            .last()
            .map_or(self.first_index().saturating_sub(1), |last| last.index)
    }

    /// Returns whether the segment holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Returns the closest indexed position at or below `index`.
    #[must_use]
    pub fn lookup(&self, index: u64) -> Option<Position> {
        self.index.read().lookup(index)
    }

    /// Returns the maximum segment size.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.file.max_size()
    }

    /// Returns the maximum entry size this segment was opened with.
    #[must_use]
    pub fn max_entry_size(&self) -> usize {
        self.max_entry_size
    }

    /// Returns the number of bytes used, descriptor included.
    #[must_use]
    pub fn bytes_used(&self) -> usize {
        self.tail.load(Ordering::Acquire)
    }

    /// Creates a reader positioned at the first entry.
    #[must_use]
    pub fn reader(self: &Arc<Self>) -> SegmentReader {
        SegmentReader::new(Arc::clone(self), self.access.reader())
    }

    /// Acquires the segment's writer.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::InvalidOperation`] if the writer is held.
    pub fn acquire_writer(self: &Arc<Self>) -> JournalResult<SegmentWriter> {
        if self
            .writer_held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(JournalError::invalid_operation(format!(
                "segment {} already has a writer",
                self.id()
            )));
        }
        Ok(SegmentWriter::new(Arc::clone(self), self.access.writer()))
    }

    /// Forces written entries to durable storage.
    ///
    /// # Errors
    ///
    /// Returns the I/O error reported by the sync.
    pub fn flush(&self) -> JournalResult<()> {
        self.access.flush()?;
        Ok(())
    }

    /// Deletes the segment file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be removed.
    pub fn delete(&self) -> JournalResult<()> {
        debug!(id = self.id(), path = %self.file.path().display(), "deleting segment");
        self.file.delete()
    }

    /// Returns a snapshot of the segment's state.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file size cannot be read.
    pub fn info(&self) -> JournalResult<SegmentInfo> {
        Ok(SegmentInfo {
            id: self.id(),
            first_index: self.first_index(),
            last_index: self.last_index(),
            path: self.file.path().to_path_buf(),
            file_size: self.file.size()?,
            bytes_used: self.bytes_used(),
            max_segment_size: self.max_size(),
        })
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id())
            .field("first_index", &self.first_index())
            .field("last_index", &self.last_index())
            .field("level", &self.level())
            .field("path", &self.file.path())
            .finish()
    }
}

/// Point-in-time description of one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    /// Segment id.
    pub id: u64,
    /// Index of the first entry.
    pub first_index: u64,
    /// Index of the last entry, `first_index - 1` if empty.
    pub last_index: u64,
    /// File path.
    pub path: PathBuf,
    /// Physical file size.
    pub file_size: u64,
    /// Bytes used by the descriptor and entries.
    pub bytes_used: usize,
    /// Maximum segment size.
    pub max_segment_size: usize,
}

impl SegmentInfo {
    /// Returns the number of entries in the segment.
    #[must_use]
    pub fn entries(&self) -> u64 {
        (self.last_index + 1).saturating_sub(self.first_index)
    }
}
