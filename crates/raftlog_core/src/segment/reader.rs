//! Sequential reader over one segment.

use super::descriptor::DESCRIPTOR_BYTES;
use super::entry::{read_entry, HEADER_BYTES};
use super::store::Segment;
use crate::error::{JournalError, JournalResult};
use raftlog_storage::FileReader;
use std::sync::Arc;

/// Reads entries from one segment, front to back.
#[derive(Debug)]
pub struct SegmentReader {
    segment: Arc<Segment>,
    reader: FileReader,
    position: usize,
}

impl SegmentReader {
    pub(super) fn new(segment: Arc<Segment>, reader: FileReader) -> Self {
        Self {
            segment,
            reader,
            position: DESCRIPTOR_BYTES,
        }
    }

    /// Returns the segment being read.
    #[must_use]
    pub fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    /// Returns the offset of the next entry to read.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves to `position`, which must lie inside the segment's entry area.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::InvalidOperation`] for a position in the
    /// descriptor or past the end of the segment.
    pub fn set_position(&mut self, position: usize) -> JournalResult<()> {
        if position < DESCRIPTOR_BYTES || position >= self.segment.max_size() {
            return Err(JournalError::invalid_operation(format!(
                "position {position} outside segment {} entry area",
                self.segment.id()
            )));
        }
        self.position = position;
        self.reader.invalidate_cache();
        Ok(())
    }

    /// Reads the next entry and passes its payload to `f`.
    ///
    /// Returns `None` without moving if there is no valid entry at the
    /// current position.
    ///
    /// # Errors
    ///
    /// Returns storage errors only.
    pub fn next_entry<R>(&mut self, mut f: impl FnMut(&[u8]) -> R) -> JournalResult<Option<R>> {
        let limit = self.segment.max_size();
        let max_entry_size = self.segment.max_entry_size();

        let mut found = read_entry(&mut self.reader, self.position, limit, max_entry_size, &mut f)?;
        if found.is_none() && self.reader.last_read_cached() {
            // The window may predate the entry; the failed read dropped it.
            found = read_entry(&mut self.reader, self.position, limit, max_entry_size, &mut f)?;
        }

        Ok(found.map(|(length, value)| {
            self.position += HEADER_BYTES + length;
            value
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::BytesMapper;
    use crate::segment::{segment_file_name, SegmentDescriptor, SegmentFile};
    use raftlog_storage::StorageLevel;
    use tempfile::tempdir;

    fn segment(dir: &tempfile::TempDir, level: StorageLevel) -> Arc<Segment> {
        let descriptor = SegmentDescriptor::builder()
            .id(1)
            .first_index(1)
            .max_segment_size(16 * 1024)
            .max_entries(1024)
            .updated(0)
            .build()
            .unwrap();
        let file =
            SegmentFile::create_new(&dir.path().join(segment_file_name("test", 1)), descriptor)
                .unwrap();
        Segment::open(file, level, 1024, 0.1).unwrap()
    }

    #[test]
    fn reads_entries_in_order() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let dir = tempdir().unwrap();
            let segment = segment(&dir, level);
            let mut writer = segment.acquire_writer().unwrap();
            writer.append(&BytesMapper, &b"one"[..]).unwrap();
            writer.append(&BytesMapper, &b"two"[..]).unwrap();

            let mut reader = segment.reader();
            assert_eq!(reader.next_entry(<[u8]>::to_vec).unwrap().unwrap(), b"one");
            assert_eq!(reader.next_entry(<[u8]>::to_vec).unwrap().unwrap(), b"two");
            assert!(reader.next_entry(<[u8]>::to_vec).unwrap().is_none(), "{level}");
        }
    }

    #[test]
    fn sees_entries_appended_after_reaching_tail() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let dir = tempdir().unwrap();
            let segment = segment(&dir, level);
            let mut writer = segment.acquire_writer().unwrap();
            writer.append(&BytesMapper, &b"first"[..]).unwrap();

            let mut reader = segment.reader();
            assert!(reader.next_entry(|_| ()).unwrap().is_some());
            assert!(reader.next_entry(|_| ()).unwrap().is_none());

            writer.append(&BytesMapper, &b"second"[..]).unwrap();
            assert_eq!(
                reader.next_entry(<[u8]>::to_vec).unwrap().unwrap(),
                b"second",
                "{level}"
            );
        }
    }

    #[test]
    fn stale_cache_is_refreshed() {
        let dir = tempdir().unwrap();
        let segment = segment(&dir, StorageLevel::Disk);
        let mut writer = segment.acquire_writer().unwrap();
        writer.append(&BytesMapper, &b"a"[..]).unwrap();

        // Fill the reader's window while the second entry is unwritten.
        let mut reader = segment.reader();
        assert!(reader.next_entry(|_| ()).unwrap().is_some());

        writer.append(&BytesMapper, &b"b"[..]).unwrap();
        assert_eq!(reader.next_entry(<[u8]>::to_vec).unwrap().unwrap(), b"b");
    }

    #[test]
    fn set_position_bounds() {
        let dir = tempdir().unwrap();
        let segment = segment(&dir, StorageLevel::Disk);
        let mut reader = segment.reader();

        assert!(reader.set_position(DESCRIPTOR_BYTES - 1).is_err());
        assert!(reader.set_position(16 * 1024).is_err());
        assert!(reader.set_position(DESCRIPTOR_BYTES).is_ok());
        assert_eq!(reader.position(), DESCRIPTOR_BYTES);
    }

    #[test]
    fn miss_on_fresh_read_is_final() {
        let dir = tempdir().unwrap();
        let segment = segment(&dir, StorageLevel::Disk);
        let mut writer = segment.acquire_writer().unwrap();
        writer.append(&BytesMapper, &b"a"[..]).unwrap();

        let mut reader = segment.reader();
        assert!(reader.next_entry(|_| ()).unwrap().is_some());
        // The tail lies in the window the first entry filled.
        let tail = reader.position();
        assert!(reader.reader.read(tail, HEADER_BYTES, |_| ()).is_ok());
        assert!(reader.reader.last_read_cached());

        // Repositioning drops the window, so the next miss reads the file.
        reader.set_position(tail).unwrap();
        assert!(reader.next_entry(|_| ()).unwrap().is_none());
        assert!(!reader.reader.last_read_cached());
        assert_eq!(reader.position(), tail);
    }
}
