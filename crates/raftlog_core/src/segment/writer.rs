//! Appending writer over one segment.

use super::descriptor::DESCRIPTOR_BYTES;
use super::entry::{read_entry, EntryHeader, HEADER_BYTES};
use super::store::Segment;
use crate::error::{JournalError, JournalResult};
use crate::mapper::ToBytesMapper;
use raftlog_storage::FileWriter;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::trace;

/// The single writer of one segment.
///
/// Dropping the writer releases the segment for the next
/// [`Segment::acquire_writer`].
#[derive(Debug)]
pub struct SegmentWriter {
    segment: Arc<Segment>,
    writer: FileWriter,
    position: usize,
}

impl SegmentWriter {
    pub(super) fn new(segment: Arc<Segment>, writer: FileWriter) -> Self {
        let position = segment.tail.load(Ordering::Acquire);
        Self {
            segment,
            writer,
            position,
        }
    }

    /// Returns the segment being written.
    #[must_use]
    pub fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    /// Returns the offset the next entry will be written at.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the index the next entry will be written at.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.segment.last_index() + 1
    }

    /// Serializes `entry` with `mapper` and appends it.
    ///
    /// Returns the payload length, or `None` if the segment has no room for
    /// this entry. Nothing is written in the `None` case.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::EntryTooLarge`] if the entry would not fit
    /// even in an empty segment, [`JournalError::EmptyEntry`] for a zero
    /// length payload, or any mapper or storage error.
    pub fn append<T, M>(&mut self, mapper: &M, entry: &T) -> JournalResult<Option<usize>>
    where
        T: ?Sized,
        M: ToBytesMapper<T> + ?Sized,
    {
        let index = self.next_index();
        let position = self.position;
        let body = position + HEADER_BYTES;
        let limit = self.segment.max_size();
        if body >= limit {
            return Ok(None);
        }

        let max_entry_size = self.segment.max_entry_size();
        let write_limit = (limit - body).min(max_entry_size);

        let mut failure = None;
        let committed = self
            .writer
            .write(position, HEADER_BYTES + write_limit, |buf| {
                let (header, payload) = buf.split_at_mut(HEADER_BYTES);
                match mapper.to_bytes(entry, payload) {
                    Ok(Some(0)) => {
                        failure = Some(JournalError::EmptyEntry { index });
                        None
                    }
                    Ok(Some(length)) if length <= payload.len() => {
                        EntryHeader::for_payload(&payload[..length]).encode(header);
                        Some(HEADER_BYTES + length)
                    }
                    Ok(Some(length)) => {
                        failure = Some(JournalError::invalid_operation(format!(
                            "mapper reported {length} bytes for a {} byte buffer",
                            payload.len()
                        )));
                        None
                    }
                    Ok(None) => None,
                    Err(e) => {
                        failure = Some(e);
                        None
                    }
                }
            })?;
        if let Some(e) = failure {
            return Err(e);
        }

        match committed {
            Some(written) => {
                self.position = position + written;
                self.segment.index.write().index(index, position);
                self.segment.tail.store(self.position, Ordering::Release);
                Ok(Some(written - HEADER_BYTES))
            }
            None if write_limit == max_entry_size => Err(JournalError::EntryTooLarge {
                index,
                max_entry_size,
            }),
            None => {
                trace!(segment = self.segment.id(), index, "no space for entry");
                Ok(None)
            }
        }
    }

    /// Discards every entry after `index`.
    ///
    /// A no-op if `index` is at or past the last entry. An `index` before
    /// the segment's first index empties the segment. The discarded bytes
    /// are zeroed so they can never be read back as entries.
    ///
    /// # Errors
    ///
    /// Returns a storage error, or [`JournalError::InvalidFormat`] if an
    /// entry the index vouches for can no longer be read.
    pub fn truncate(&mut self, index: u64) -> JournalResult<()> {
        if index >= self.segment.last_index() {
            return Ok(());
        }

        let old_end = self.position;
        let new_end = {
            let mut segment_index = self.segment.index.write();
            let floor = segment_index.truncate(index);

            if index < self.segment.first_index() {
                DESCRIPTOR_BYTES
            } else {
                // Scan from the closest known entry to the end of `index`.
                let (mut next, mut position) = floor.map_or(
                    (self.segment.first_index(), DESCRIPTOR_BYTES),
                    |p| (p.index, p.position),
                );
                let limit = self.segment.max_size();
                let max_entry_size = self.segment.max_entry_size();
                let mut reader = self.segment.access.reader();
                while next <= index {
                    let Some((length, ())) =
                        read_entry(&mut reader, position, limit, max_entry_size, |_| ())?
                    else {
                        return Err(JournalError::invalid_format(format!(
                            "segment {} lost entry {next} during truncation",
                            self.segment.id()
                        )));
                    };
                    if segment_index.last().map_or(true, |last| last.index < next) {
                        segment_index.index(next, position);
                    }
                    position += HEADER_BYTES + length;
                    next += 1;
                }
                position
            }
        };

        self.position = new_end;
        self.segment.tail.store(new_end, Ordering::Release);

        let limit = self.segment.max_size();
        let zero_end = old_end.max(new_end + HEADER_BYTES).min(limit);
        self.writer.zero(new_end, zero_end.saturating_sub(new_end))?;
        trace!(segment = self.segment.id(), index, new_end, old_end, "truncated");
        Ok(())
    }

    /// Zeroes everything after the last entry if the bytes there are not
    /// already zero, so that an interrupted write left behind by a crash
    /// cannot line up with a later append.
    ///
    /// Returns the header found after the last entry if anything was zeroed.
    /// Its length tells a torn write apart from an intact entry longer than
    /// the current maximum entry size.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn discard_residue(&mut self) -> JournalResult<Option<EntryHeader>> {
        let limit = self.segment.max_size();
        if self.position + HEADER_BYTES > limit {
            return Ok(None);
        }
        let mut reader = self.segment.access.reader();
        let residue = reader.read(self.position, HEADER_BYTES, |header| {
            header
                .iter()
                .any(|&b| b != 0)
                .then(|| EntryHeader::decode(header))
        })?;
        if residue.is_some() {
            self.writer.zero(self.position, limit - self.position)?;
        }
        Ok(residue)
    }

    /// Forces written entries to durable storage.
    ///
    /// # Errors
    ///
    /// Returns the I/O error reported by the sync.
    pub fn flush(&mut self) -> JournalResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        self.segment.writer_held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::BytesMapper;
    use crate::segment::{segment_file_name, SegmentDescriptor, SegmentFile};
    use raftlog_storage::StorageLevel;
    use tempfile::{tempdir, TempDir};

    const LEVELS: [StorageLevel; 2] = [StorageLevel::Disk, StorageLevel::Mapped];

    fn segment(dir: &TempDir, level: StorageLevel, size: usize, max_entry: usize) -> Arc<Segment> {
        let descriptor = SegmentDescriptor::builder()
            .id(1)
            .first_index(1)
            .max_segment_size(size)
            .max_entries(1024)
            .updated(0)
            .build()
            .unwrap();
        let path = dir.path().join(segment_file_name("test", 1));
        let file = SegmentFile::create_new(&path, descriptor).unwrap();
        Segment::open(file, level, max_entry, 0.25).unwrap()
    }

    fn reopen(dir: &TempDir, level: StorageLevel, max_entry: usize) -> Arc<Segment> {
        let path = dir.path().join(segment_file_name("test", 1));
        Segment::open(SegmentFile::open_existing(&path).unwrap(), level, max_entry, 0.25).unwrap()
    }

    fn read_all(segment: &Arc<Segment>) -> Vec<Vec<u8>> {
        let mut reader = segment.reader();
        let mut out = Vec::new();
        while let Some(bytes) = reader.next_entry(<[u8]>::to_vec).unwrap() {
            out.push(bytes);
        }
        out
    }

    #[test]
    fn append_advances_index_and_position() {
        for level in LEVELS {
            let dir = tempdir().unwrap();
            let segment = segment(&dir, level, 1024, 64);
            let mut writer = segment.acquire_writer().unwrap();

            assert_eq!(writer.next_index(), 1);
            assert_eq!(writer.append(&BytesMapper, &b"hello"[..]).unwrap(), Some(5));
            assert_eq!(writer.next_index(), 2);
            assert_eq!(writer.position(), DESCRIPTOR_BYTES + HEADER_BYTES + 5);
            assert_eq!(segment.last_index(), 1, "{level}");
        }
    }

    #[test]
    fn full_segment_reports_no_space() {
        for level in LEVELS {
            let dir = tempdir().unwrap();
            // Room for exactly two 20-byte entries after the descriptor.
            let segment = segment(&dir, level, DESCRIPTOR_BYTES + 2 * 28, 64);
            let mut writer = segment.acquire_writer().unwrap();

            assert_eq!(writer.append(&BytesMapper, &[1u8; 20][..]).unwrap(), Some(20));
            assert_eq!(writer.append(&BytesMapper, &[2u8; 20][..]).unwrap(), Some(20));
            assert_eq!(writer.append(&BytesMapper, &[3u8; 1][..]).unwrap(), None, "{level}");
            assert_eq!(writer.next_index(), 3);
        }
    }

    #[test]
    fn partial_room_reports_no_space_not_too_large() {
        let dir = tempdir().unwrap();
        let segment = segment(&dir, StorageLevel::Disk, DESCRIPTOR_BYTES + 40, 64);
        let mut writer = segment.acquire_writer().unwrap();

        // 32 bytes of body room, less than max entry size: roll over.
        assert_eq!(writer.append(&BytesMapper, &[0u8; 40][..]).unwrap(), None);
        assert_eq!(writer.position(), DESCRIPTOR_BYTES);
    }

    #[test]
    fn oversized_entry_is_rejected() {
        for level in LEVELS {
            let dir = tempdir().unwrap();
            let segment = segment(&dir, level, 1024, 64);
            let mut writer = segment.acquire_writer().unwrap();

            let result = writer.append(&BytesMapper, &[0u8; 65][..]);
            assert!(
                matches!(
                    result,
                    Err(JournalError::EntryTooLarge {
                        index: 1,
                        max_entry_size: 64
                    })
                ),
                "{level}"
            );
            assert_eq!(writer.position(), DESCRIPTOR_BYTES);
            assert!(segment.is_empty());
        }
    }

    #[test]
    fn empty_entry_is_rejected() {
        let dir = tempdir().unwrap();
        let segment = segment(&dir, StorageLevel::Disk, 1024, 64);
        let mut writer = segment.acquire_writer().unwrap();

        let result = writer.append(&BytesMapper, &b""[..]);
        assert!(matches!(result, Err(JournalError::EmptyEntry { index: 1 })));
    }

    #[test]
    fn truncate_to_last_is_noop() {
        let dir = tempdir().unwrap();
        let segment = segment(&dir, StorageLevel::Disk, 1024, 64);
        let mut writer = segment.acquire_writer().unwrap();
        for i in 0..3u8 {
            writer.append(&BytesMapper, &[i; 4][..]).unwrap();
        }
        let position = writer.position();

        writer.truncate(3).unwrap();
        writer.truncate(10).unwrap();
        assert_eq!(writer.position(), position);
        assert_eq!(segment.last_index(), 3);
    }

    #[test]
    fn truncate_mid_segment_scans_from_index() {
        for level in LEVELS {
            let dir = tempdir().unwrap();
            let segment = segment(&dir, level, 4096, 64);
            let mut writer = segment.acquire_writer().unwrap();
            for i in 1..=10u8 {
                writer.append(&BytesMapper, &[i; 8][..]).unwrap();
            }

            // Stride is 4, so entry 6 is found by scanning from entry 4.
            writer.truncate(6).unwrap();
            assert_eq!(segment.last_index(), 6, "{level}");
            assert_eq!(writer.next_index(), 7);
            assert_eq!(writer.position(), DESCRIPTOR_BYTES + 6 * (HEADER_BYTES + 8));
            assert_eq!(read_all(&segment).len(), 6);

            // Appending continues at the new end.
            writer.append(&BytesMapper, &b"again"[..]).unwrap();
            let entries = read_all(&segment);
            assert_eq!(entries.len(), 7);
            assert_eq!(entries[6], b"again");
        }
    }

    #[test]
    fn truncate_before_first_index_empties_segment() {
        for level in LEVELS {
            let dir = tempdir().unwrap();
            let segment = segment(&dir, level, 1024, 64);
            let mut writer = segment.acquire_writer().unwrap();
            for i in 1..=3u8 {
                writer.append(&BytesMapper, &[i; 8][..]).unwrap();
            }

            writer.truncate(0).unwrap();
            assert!(segment.is_empty(), "{level}");
            assert_eq!(segment.last_index(), 0);
            assert_eq!(writer.position(), DESCRIPTOR_BYTES);
            assert!(read_all(&segment).is_empty());
        }
    }

    #[test]
    fn truncate_to_first_index_keeps_one() {
        let dir = tempdir().unwrap();
        let segment = segment(&dir, StorageLevel::Disk, 1024, 64);
        let mut writer = segment.acquire_writer().unwrap();
        for i in 1..=3u8 {
            writer.append(&BytesMapper, &[i; 8][..]).unwrap();
        }

        writer.truncate(1).unwrap();
        assert_eq!(segment.last_index(), 1);
        assert_eq!(read_all(&segment), vec![vec![1u8; 8]]);
    }

    #[test]
    fn truncated_entries_stay_gone_after_reopen() {
        for level in LEVELS {
            let dir = tempdir().unwrap();
            {
                let segment = segment(&dir, level, 1024, 64);
                let mut writer = segment.acquire_writer().unwrap();
                for i in 1..=5u8 {
                    writer.append(&BytesMapper, &[i; 16][..]).unwrap();
                }
                writer.truncate(2).unwrap();
                // A shorter entry must not re-expose the old entry 4.
                writer.append(&BytesMapper, &[9u8; 2][..]).unwrap();
                writer.flush().unwrap();
            }

            let segment = reopen(&dir, level, 64);
            assert_eq!(segment.last_index(), 3, "{level}");
            let entries = read_all(&segment);
            assert_eq!(entries[2], vec![9u8; 2]);
        }
    }

    #[test]
    fn residue_after_torn_entry_is_discarded() {
        use std::io::{Seek, SeekFrom, Write};

        for level in LEVELS {
            let dir = tempdir().unwrap();
            {
                let segment = segment(&dir, level, 1024, 64);
                let mut writer = segment.acquire_writer().unwrap();
                for i in 1..=3u8 {
                    writer.append(&BytesMapper, &[i; 16][..]).unwrap();
                }
                writer.flush().unwrap();
            }

            // Break entry 2's checksum; entry 3 stays intact behind it.
            let path = dir.path().join(segment_file_name("test", 1));
            let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start((DESCRIPTOR_BYTES + 24 + 4) as u64))
                .unwrap();
            file.write_all(&[0xff; 4]).unwrap();
            drop(file);

            {
                let segment = reopen(&dir, level, 64);
                assert_eq!(segment.last_index(), 1);
                let mut writer = segment.acquire_writer().unwrap();
                let residue = writer.discard_residue().unwrap().unwrap();
                assert_eq!(residue.length, 16, "{level}");
                assert!(writer.discard_residue().unwrap().is_none());
                writer.append(&BytesMapper, &[7u8; 16][..]).unwrap();
                writer.flush().unwrap();
            }

            let segment = reopen(&dir, level, 64);
            assert_eq!(segment.last_index(), 2, "{level}");
            assert_eq!(read_all(&segment)[1], vec![7u8; 16]);
        }
    }

    #[test]
    fn writer_survives_reacquire() {
        let dir = tempdir().unwrap();
        let segment = segment(&dir, StorageLevel::Disk, 1024, 64);
        {
            let mut writer = segment.acquire_writer().unwrap();
            writer.append(&BytesMapper, &b"a"[..]).unwrap();
        }
        let mut writer = segment.acquire_writer().unwrap();
        assert_eq!(writer.next_index(), 2);
        writer.append(&BytesMapper, &b"b"[..]).unwrap();
        assert_eq!(read_all(&segment), vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn residue_reports_entry_over_max_size() {
        for level in LEVELS {
            let dir = tempdir().unwrap();
            {
                let segment = segment(&dir, level, 1024, 64);
                let mut writer = segment.acquire_writer().unwrap();
                writer.append(&BytesMapper, &[1u8; 8][..]).unwrap();
                writer.append(&BytesMapper, &[2u8; 40][..]).unwrap();
                writer.flush().unwrap();
            }

            // Intact, but longer than the lowered maximum.
            let segment = reopen(&dir, level, 16);
            assert_eq!(segment.last_index(), 1, "{level}");
            let mut writer = segment.acquire_writer().unwrap();
            let residue = writer.discard_residue().unwrap().unwrap();
            assert_eq!(residue.length, 40, "{level}");
            assert_eq!(residue, EntryHeader::for_payload(&[2u8; 40]));
        }
    }
}
