//! The journal writer.

use super::segmented::JournalInner;
use crate::error::{JournalError, JournalResult};
use crate::mapper::ToBytesMapper;
use crate::segment::SegmentWriter;
use std::sync::Arc;
use tracing::debug;

/// Appends entries to a journal.
///
/// A journal has at most one writer. Dropping it lets
/// [`SegmentedJournal::writer`](crate::SegmentedJournal::writer) hand out a
/// new one.
#[derive(Debug)]
pub struct EntryWriter {
    journal: Arc<JournalInner>,
    writer: SegmentWriter,
}

impl EntryWriter {
    pub(super) fn new(journal: Arc<JournalInner>, writer: SegmentWriter) -> Self {
        Self { journal, writer }
    }

    /// Returns the index the next appended entry will receive.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.writer.next_index()
    }

    /// Returns the index of the last appended entry.
    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.writer.segment().last_index()
    }

    /// Serializes `entry` with `mapper` and appends it at [`Self::next_index`],
    /// returning the payload length.
    ///
    /// A full segment is sealed and the entry goes into a new one.
    ///
    /// # Errors
    ///
    /// - [`JournalError::EntryTooLarge`] if the entry does not fit in an
    ///   empty segment or exceeds the maximum entry size
    /// - [`JournalError::EmptyEntry`] if the mapper writes nothing
    /// - [`JournalError::StorageExhausted`] if a new segment is needed but
    ///   the disk is nearly full
    pub fn append<T, M>(&mut self, mapper: &M, entry: &T) -> JournalResult<usize>
    where
        T: ?Sized,
        M: ToBytesMapper<T> + ?Sized,
    {
        self.journal.ensure_open()?;
        if let Some(length) = self.writer.append(mapper, entry)? {
            return Ok(length);
        }

        self.checkpoint()?;
        self.writer
            .append(mapper, entry)?
            .ok_or_else(|| JournalError::EntryTooLarge {
                index: self.writer.next_index(),
                max_entry_size: self.journal.config().max_entry_size,
            })
    }

    /// Declares every entry up to `index` committed.
    ///
    /// The commit index never moves backwards. Flushes the current segment
    /// when the journal is configured to flush on commit.
    ///
    /// # Errors
    ///
    /// Returns the flush error, or [`JournalError::Closed`].
    pub fn commit(&mut self, index: u64) -> JournalResult<()> {
        self.journal.ensure_open()?;
        self.journal.set_commit_index(index);
        if self.journal.config().flush_on_commit {
            self.writer.flush()?;
        }
        Ok(())
    }

    /// Forces appended entries to durable storage.
    ///
    /// # Errors
    ///
    /// Returns the I/O error reported by the sync.
    pub fn flush(&mut self) -> JournalResult<()> {
        self.journal.ensure_open()?;
        self.writer.flush()
    }

    /// Seals the current segment and starts a new one.
    ///
    /// Does nothing while the current segment is empty.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::StorageExhausted`] or an I/O error.
    pub fn checkpoint(&mut self) -> JournalResult<()> {
        self.journal.ensure_open()?;
        if self.writer.segment().is_empty() {
            return Ok(());
        }
        self.writer.flush()?;
        let next = self.journal.create_next_segment()?;
        self.writer = next.acquire_writer()?;
        Ok(())
    }

    /// Discards every entry at or after `index`, so the next append
    /// receives `index`.
    ///
    /// An `index` before the first retained entry drops every segment and
    /// restarts the journal at `index`. Readers positioned past the new end
    /// are moved back to it.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::IndexOutOfRange`] if `index` is at or below
    /// the commit index, or more than one past the last entry.
    pub fn reset(&mut self, index: u64) -> JournalResult<()> {
        self.journal.ensure_open()?;
        let commit_index = self.journal.commit_index();
        if index <= commit_index {
            return Err(JournalError::index_out_of_range(
                index,
                format!("cannot reset at or below commit index {commit_index}"),
            ));
        }
        let last_index = self.last_index();
        if index > last_index + 1 {
            return Err(JournalError::index_out_of_range(
                index,
                format!("cannot reset past last index {last_index}"),
            ));
        }

        if index < self.journal.first_index() {
            let segment = self.journal.reset_segments(index)?;
            self.writer = segment.acquire_writer()?;
            self.journal.reset_head(index)?;
            return self.journal.reset_tail(index);
        }

        let current = self.journal.remove_segments_after(index)?;
        if !Arc::ptr_eq(&current, self.writer.segment()) {
            self.writer = current.acquire_writer()?;
        }
        self.writer.truncate(index - 1)?;
        debug!(name = %self.journal.config().name, index, "reset journal writer");
        self.journal.reset_tail(index)
    }
}

impl Drop for EntryWriter {
    fn drop(&mut self) {
        self.journal.release_writer();
    }
}
