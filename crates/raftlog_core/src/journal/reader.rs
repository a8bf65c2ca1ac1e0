//! Journal readers.

use super::segmented::JournalInner;
use crate::error::JournalResult;
use crate::mapper::{FromBytesMapper, Indexed};
use crate::segment::SegmentReader;
use parking_lot::Mutex;
use std::sync::Arc;

/// Position of one reader. Shared with the journal so that compaction and
/// writer resets can move it.
#[derive(Debug)]
pub(crate) struct ReaderCursor {
    commits_only: bool,
    reader: SegmentReader,
    next_index: u64,
}

impl ReaderCursor {
    fn open(journal: &JournalInner, index: u64, commits_only: bool) -> JournalResult<Self> {
        let segment = journal.segment(index)?;
        let mut cursor = Self {
            commits_only,
            next_index: segment.first_index(),
            reader: segment.reader(),
        };
        cursor.reset(journal, index)?;
        Ok(cursor)
    }

    pub(crate) fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Positions the cursor so the next entry read is `index`, or the
    /// closest entry after it that exists.
    pub(crate) fn reset(&mut self, journal: &JournalInner, index: u64) -> JournalResult<()> {
        let segment = journal.segment(index)?;
        self.reader = segment.reader();
        self.next_index = segment.first_index();

        if let Some(position) = segment.lookup(index) {
            if position.index >= self.next_index {
                self.reader.set_position(position.position)?;
                self.next_index = position.index;
            }
        }

        let last_index = segment.last_index();
        while self.next_index < index && self.next_index <= last_index {
            if self.reader.next_entry(|_| ())?.is_none() {
                break;
            }
            self.next_index += 1;
        }
        Ok(())
    }

    fn next<R>(
        &mut self,
        journal: &JournalInner,
        mut f: impl FnMut(u64, &[u8]) -> R,
    ) -> JournalResult<Option<(u64, R)>> {
        journal.ensure_open()?;
        let index = self.next_index;
        if self.commits_only && index > journal.commit_index() {
            return Ok(None);
        }

        if index > self.reader.segment().last_index() {
            let Some(next) = journal.next_segment(self.reader.segment().first_index()) else {
                return Ok(None);
            };
            if next.first_index() != index {
                return Ok(None);
            }
            self.reader = next.reader();
            if index > next.last_index() {
                return Ok(None);
            }
        }

        match self.reader.next_entry(|bytes| f(index, bytes))? {
            Some(value) => {
                self.next_index += 1;
                Ok(Some((index, value)))
            }
            None => Ok(None),
        }
    }
}

/// Reads entries from a journal in index order.
///
/// Readers see entries as soon as they are appended. A commits reader only
/// sees entries up to the journal's commit index. Dropping the reader
/// detaches it from the journal.
///
/// ```rust
/// use raftlog_core::{BytesMapper, JournalConfig, SegmentedJournal};
///
/// let dir = tempfile::tempdir().unwrap();
/// let journal = SegmentedJournal::open(JournalConfig::new().directory(dir.path())).unwrap();
/// let mut writer = journal.writer().unwrap();
/// for entry in [&b"a"[..], b"b", b"c"] {
///     writer.append(&BytesMapper, entry).unwrap();
/// }
///
/// let mut reader = journal.open_reader(2).unwrap();
/// let entry = reader.next_indexed(&BytesMapper).unwrap().unwrap();
/// assert_eq!(entry.index, 2);
/// assert_eq!(entry.entry, b"b");
/// ```
#[derive(Debug)]
pub struct EntryReader {
    id: u64,
    journal: Arc<JournalInner>,
    cursor: Arc<Mutex<ReaderCursor>>,
    commits_only: bool,
}

impl EntryReader {
    pub(super) fn open(
        journal: &Arc<JournalInner>,
        index: u64,
        commits_only: bool,
    ) -> JournalResult<Self> {
        journal.ensure_open()?;
        let cursor = Arc::new(Mutex::new(ReaderCursor::open(journal, index, commits_only)?));
        let id = journal.register_reader(Arc::clone(&cursor));
        Ok(Self {
            id,
            journal: Arc::clone(journal),
            cursor,
            commits_only,
        })
    }

    /// Returns the index the next call to [`Self::next`] would read.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.cursor.lock().next_index()
    }

    /// Returns whether this reader stops at the commit index.
    #[must_use]
    pub fn is_commits_reader(&self) -> bool {
        self.commits_only
    }

    /// Reads the next entry, or `None` at the end of the journal.
    ///
    /// # Errors
    ///
    /// Returns the mapper's error, a storage error, or
    /// [`JournalError::Closed`](crate::JournalError::Closed).
    pub fn next<T, M>(&mut self, mapper: &M) -> JournalResult<Option<T>>
    where
        M: FromBytesMapper<T> + ?Sized,
    {
        Ok(self.next_indexed(mapper)?.map(|indexed| indexed.entry))
    }

    /// Reads the next entry together with its index.
    ///
    /// # Errors
    ///
    /// Same as [`Self::next`].
    pub fn next_indexed<T, M>(&mut self, mapper: &M) -> JournalResult<Option<Indexed<T>>>
    where
        M: FromBytesMapper<T> + ?Sized,
    {
        let mut cursor = self.cursor.lock();
        match cursor.next(&self.journal, |index, bytes| mapper.from_bytes(index, bytes))? {
            Some((index, entry)) => Ok(Some(Indexed::new(index, entry?))),
            None => Ok(None),
        }
    }

    /// Moves the reader so the next entry read is `index`.
    ///
    /// # Errors
    ///
    /// Returns a storage error or
    /// [`JournalError::Closed`](crate::JournalError::Closed).
    pub fn reset(&mut self, index: u64) -> JournalResult<()> {
        self.journal.ensure_open()?;
        self.cursor.lock().reset(&self.journal, index)
    }

    /// Moves the reader back to the first entry of the journal.
    ///
    /// # Errors
    ///
    /// Same as [`Self::reset`].
    pub fn rewind(&mut self) -> JournalResult<()> {
        let first_index = self.journal.first_index();
        self.reset(first_index)
    }

    /// Detaches the reader from the journal.
    pub fn close(self) {}
}

impl Drop for EntryReader {
    fn drop(&mut self) {
        self.journal.deregister_reader(self.id);
    }
}
