//! Storage-level dispatch for segment file access.
//!
//! A [`FileAccess`] is created once per open segment file. It hands out any
//! number of [`FileReader`]s and the [`FileWriter`]s used by the segment's
//! single writer. The set of back-ends is closed: [`StorageLevel::Disk`] and
//! [`StorageLevel::Mapped`], so dispatch is a plain `match`.
//!
//! Every access is bounded by the segment's maximum size. Callers borrow the
//! bytes through a closure, which lets the mapped back-end expose the mapped
//! region directly while the disk back-end exposes its scratch buffer.

use crate::disk::{DiskFileAccess, DiskFileReader, DiskFileWriter};
use crate::error::StorageResult;
use crate::level::StorageLevel;
use crate::mapped::{MappedFileAccess, MappedFileReader, MappedFileWriter};
use parking_lot::Mutex;
use std::fs::File;
use std::sync::Arc;

/// Smallest I/O unit the disk back-end will buffer.
pub const MIN_IO_SIZE: usize = 8 * 1024;

/// Picks the disk scratch buffer size for a segment.
///
/// Small segments are buffered whole. Larger ones get room for one maximal
/// read (a full entry plus its header), but never less than [`MIN_IO_SIZE`].
#[must_use]
pub fn choose_buffer_size(max_segment_size: usize, max_read_size: usize) -> usize {
    if max_segment_size <= MIN_IO_SIZE {
        max_segment_size
    } else {
        max_read_size.max(MIN_IO_SIZE)
    }
}

/// Access to one segment file at a given [`StorageLevel`].
#[derive(Debug, Clone)]
pub enum FileAccess {
    /// Buffered positional I/O.
    Disk(DiskFileAccess),
    /// Memory-mapped I/O.
    Mapped(MappedFileAccess),
}

impl FileAccess {
    /// Opens access to `file`, bounded by `max_segment_size` bytes.
    ///
    /// `max_read_size` is the largest single read the caller will issue; it
    /// sizes the disk back-end's buffers. The mapped back-end grows the file
    /// to `max_segment_size` if it is shorter.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be resized or mapped.
    pub fn open(
        level: StorageLevel,
        file: Arc<Mutex<File>>,
        max_segment_size: usize,
        max_read_size: usize,
    ) -> StorageResult<Self> {
        match level {
            StorageLevel::Disk => Ok(Self::Disk(DiskFileAccess::new(
                file,
                max_segment_size,
                choose_buffer_size(max_segment_size, max_read_size),
            ))),
            StorageLevel::Mapped => {
                let file = file.lock();
                Ok(Self::Mapped(MappedFileAccess::open(&file, max_segment_size)?))
            }
        }
    }

    /// Returns the storage level of this access.
    #[must_use]
    pub fn level(&self) -> StorageLevel {
        match self {
            Self::Disk(_) => StorageLevel::Disk,
            Self::Mapped(_) => StorageLevel::Mapped,
        }
    }

    /// Returns the maximum segment size enforced on every access.
    #[must_use]
    pub fn limit(&self) -> usize {
        match self {
            Self::Disk(access) => access.limit(),
            Self::Mapped(access) => access.limit(),
        }
    }

    /// Forces everything written through any writer to durable storage.
    ///
    /// # Errors
    ///
    /// Returns the I/O error reported by the sync.
    pub fn flush(&self) -> StorageResult<()> {
        match self {
            Self::Disk(access) => access.flush(),
            Self::Mapped(access) => access.flush(),
        }
    }

    /// Creates a new reader with its own cache.
    #[must_use]
    pub fn reader(&self) -> FileReader {
        match self {
            Self::Disk(access) => FileReader::Disk(access.reader()),
            Self::Mapped(access) => FileReader::Mapped(access.reader()),
        }
    }

    /// Creates a new writer.
    #[must_use]
    pub fn writer(&self) -> FileWriter {
        match self {
            Self::Disk(access) => FileWriter::Disk(access.writer()),
            Self::Mapped(access) => FileWriter::Mapped(access.writer()),
        }
    }
}

/// Random-access reader over one segment file.
#[derive(Debug)]
pub enum FileReader {
    /// Buffered disk reader.
    Disk(DiskFileReader),
    /// Mapped reader.
    Mapped(MappedFileReader),
}

impl FileReader {
    /// Reads `size` bytes at `position` and passes them to `f`.
    ///
    /// Bytes past the physical end of a disk file read as zero.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::OutOfBounds`] if the range crosses the
    /// segment limit, or an I/O error from the underlying file.
    pub fn read<R>(
        &mut self,
        position: usize,
        size: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> StorageResult<R> {
        match self {
            Self::Disk(reader) => reader.read(position, size, f),
            Self::Mapped(reader) => reader.read(position, size, f),
        }
    }

    /// Forces the next read to fetch from the file.
    pub fn invalidate_cache(&mut self) {
        match self {
            Self::Disk(reader) => reader.invalidate_cache(),
            Self::Mapped(_) => {}
        }
    }

    /// Returns true if the last read was served from a cached window, which
    /// may predate writes made since.
    ///
    /// Mapped reads always see the file and never report a cache hit.
    #[must_use]
    pub fn last_read_cached(&self) -> bool {
        match self {
            Self::Disk(reader) => reader.last_read_cached(),
            Self::Mapped(_) => false,
        }
    }
}

/// Writer over one segment file.
#[derive(Debug)]
pub enum FileWriter {
    /// Buffered disk writer.
    Disk(DiskFileWriter),
    /// Mapped writer.
    Mapped(MappedFileWriter),
}

impl FileWriter {
    /// Exposes a `size`-byte window at `position` to `f` and commits what it
    /// wrote.
    ///
    /// `f` returns the number of bytes to commit from the start of the
    /// window, or `None` to abandon the write. Returns what `f` returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the window crosses the segment limit, if `f`
    /// reports more bytes than the window holds, or if the write fails.
    pub fn write(
        &mut self,
        position: usize,
        size: usize,
        f: impl FnOnce(&mut [u8]) -> Option<usize>,
    ) -> StorageResult<Option<usize>> {
        match self {
            Self::Disk(writer) => writer.write(position, size, f),
            Self::Mapped(writer) => writer.write(position, size, f),
        }
    }

    /// Overwrites `len` bytes at `position` with zeros.
    ///
    /// Disk readers of the same file drop their caches afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the range crosses the segment limit or the write
    /// fails.
    pub fn zero(&mut self, position: usize, len: usize) -> StorageResult<()> {
        match self {
            Self::Disk(writer) => writer.zero(position, len),
            Self::Mapped(writer) => writer.zero(position, len),
        }
    }

    /// Forces written data to durable storage.
    ///
    /// # Errors
    ///
    /// Returns the I/O error reported by the sync.
    pub fn flush(&mut self) -> StorageResult<()> {
        match self {
            Self::Disk(writer) => writer.flush(),
            Self::Mapped(writer) => writer.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;
    use proptest::prelude::*;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    fn open_file(path: &std::path::Path) -> Arc<Mutex<File>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .unwrap();
        Arc::new(Mutex::new(file))
    }

    fn each_level(f: impl Fn(StorageLevel, FileAccess)) {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let dir = tempdir().unwrap();
            let file = open_file(&dir.path().join("segment.log"));
            let access = FileAccess::open(level, file, 64 * 1024, 1024).unwrap();
            f(level, access);
        }
    }

    #[test]
    fn buffer_size_heuristic() {
        // Small segment: buffer it all.
        assert_eq!(choose_buffer_size(4096, 1 << 20), 4096);
        // Small entries: floor at MIN_IO_SIZE.
        assert_eq!(choose_buffer_size(1 << 25, 100), MIN_IO_SIZE);
        // Large entries: one full read.
        assert_eq!(choose_buffer_size(1 << 25, (1 << 20) + 8), (1 << 20) + 8);
    }

    #[test]
    fn write_then_read_back() {
        each_level(|level, access| {
            let mut writer = access.writer();
            let committed = writer
                .write(100, 16, |buf| {
                    buf[..5].copy_from_slice(b"hello");
                    Some(5)
                })
                .unwrap();
            assert_eq!(committed, Some(5), "{level}");

            let mut reader = access.reader();
            let bytes = reader.read(100, 5, <[u8]>::to_vec).unwrap();
            assert_eq!(bytes, b"hello", "{level}");
        });
    }

    #[test]
    fn abandoned_write_commits_nothing() {
        each_level(|level, access| {
            let mut writer = access.writer();
            let committed = writer.write(0, 8, |_| None).unwrap();
            assert_eq!(committed, None, "{level}");

            let mut reader = access.reader();
            let bytes = reader.read(0, 8, <[u8]>::to_vec).unwrap();
            assert_eq!(bytes, vec![0; 8], "{level}");
        });
    }

    #[test]
    fn access_past_limit_fails() {
        each_level(|level, access| {
            let limit = access.limit();
            let mut reader = access.reader();
            let result = reader.read(limit - 4, 8, |_| ());
            assert!(
                matches!(result, Err(StorageError::OutOfBounds { .. })),
                "{level}"
            );

            let mut writer = access.writer();
            let result = writer.write(limit, 1, |_| Some(1));
            assert!(
                matches!(result, Err(StorageError::OutOfBounds { .. })),
                "{level}"
            );
        });
    }

    #[test]
    fn overflowing_callback_is_rejected() {
        each_level(|level, access| {
            let mut writer = access.writer();
            let result = writer.write(0, 4, |_| Some(5));
            assert!(
                matches!(result, Err(StorageError::WriteOverflow { .. })),
                "{level}"
            );
        });
    }

    #[test]
    fn zero_is_visible_to_existing_readers() {
        each_level(|level, access| {
            let mut writer = access.writer();
            writer
                .write(64, 4, |buf| {
                    buf.copy_from_slice(&[1, 2, 3, 4]);
                    Some(4)
                })
                .unwrap();

            let mut reader = access.reader();
            assert_eq!(
                reader.read(64, 4, <[u8]>::to_vec).unwrap(),
                vec![1, 2, 3, 4],
                "{level}"
            );

            writer.zero(64, 4).unwrap();
            assert_eq!(
                reader.read(64, 4, <[u8]>::to_vec).unwrap(),
                vec![0; 4],
                "{level}"
            );
        });
    }

    #[test]
    fn flush_succeeds() {
        each_level(|level, access| {
            let mut writer = access.writer();
            writer
                .write(0, 1, |buf| {
                    buf[0] = 7;
                    Some(1)
                })
                .unwrap();
            assert!(writer.flush().is_ok(), "{level}");
            assert!(access.flush().is_ok(), "{level}");
        });
    }

    const SMALL_LIMIT: usize = 4096;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn access_is_bounded_by_limit(
            position in 0usize..SMALL_LIMIT + 512,
            size in 0usize..1024,
            fill in any::<u8>(),
        ) {
            let in_bounds = position + size <= SMALL_LIMIT;
            for level in [StorageLevel::Disk, StorageLevel::Mapped] {
                let dir = tempdir().unwrap();
                let file = open_file(&dir.path().join("segment.log"));
                let access = FileAccess::open(level, file, SMALL_LIMIT, 256).unwrap();

                let mut writer = access.writer();
                let written = writer.write(position, size, |buf| {
                    buf.fill(fill);
                    Some(buf.len())
                });
                match written {
                    Ok(committed) => {
                        prop_assert!(in_bounds, "{} wrote {}+{}", level, position, size);
                        prop_assert_eq!(committed, Some(size));
                    }
                    Err(StorageError::OutOfBounds { .. }) => {
                        prop_assert!(!in_bounds, "{} rejected {}+{}", level, position, size);
                    }
                    Err(e) => prop_assert!(false, "{}: {}", level, e),
                }

                let mut reader = access.reader();
                match reader.read(position, size, <[u8]>::to_vec) {
                    Ok(bytes) => {
                        prop_assert!(in_bounds, "{} read {}+{}", level, position, size);
                        prop_assert_eq!(bytes, vec![fill; size]);
                    }
                    Err(StorageError::OutOfBounds { .. }) => {
                        prop_assert!(!in_bounds, "{} rejected {}+{}", level, position, size);
                    }
                    Err(e) => prop_assert!(false, "{}: {}", level, e),
                }
            }
        }
    }
}

