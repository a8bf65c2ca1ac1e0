//! Buffered positional I/O back-end.

use crate::error::{check_bounds, StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Disk access to one segment file.
///
/// Readers and the writer share the file handle behind a lock; each of them
/// owns a scratch buffer sized by [`crate::choose_buffer_size`].
///
/// # Cache coherence
///
/// Readers cache a window of the file. Appends only ever land past data a
/// reader has validated, and a reader drops its cache whenever it fails to
/// decode an entry, so appended data becomes visible naturally. Zeroing
/// (truncation) rewrites bytes a reader may have cached, so it bumps a shared
/// epoch that every reader checks before serving from its cache.
#[derive(Debug, Clone)]
pub struct DiskFileAccess {
    file: Arc<Mutex<File>>,
    limit: usize,
    buffer_size: usize,
    epoch: Arc<AtomicU64>,
}

impl DiskFileAccess {
    pub(crate) fn new(file: Arc<Mutex<File>>, limit: usize, buffer_size: usize) -> Self {
        Self {
            file,
            limit,
            buffer_size,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the scratch buffer size used by readers and writers.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub(crate) fn flush(&self) -> StorageResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    pub(crate) fn reader(&self) -> DiskFileReader {
        DiskFileReader {
            file: Arc::clone(&self.file),
            limit: self.limit,
            buffer: vec![0; self.buffer_size],
            window: None,
            last_read_cached: false,
            epoch: Arc::clone(&self.epoch),
        }
    }

    pub(crate) fn writer(&self) -> DiskFileWriter {
        DiskFileWriter {
            file: Arc::clone(&self.file),
            limit: self.limit,
            buffer: vec![0; self.buffer_size],
            epoch: Arc::clone(&self.epoch),
        }
    }
}

/// The file range currently held in a reader's buffer.
#[derive(Debug, Clone, Copy)]
struct Window {
    start: usize,
    len: usize,
    epoch: u64,
}

/// Buffered disk reader.
#[derive(Debug)]
pub struct DiskFileReader {
    file: Arc<Mutex<File>>,
    limit: usize,
    buffer: Vec<u8>,
    window: Option<Window>,
    last_read_cached: bool,
    epoch: Arc<AtomicU64>,
}

impl DiskFileReader {
    pub(crate) fn read<R>(
        &mut self,
        position: usize,
        size: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> StorageResult<R> {
        check_bounds(position, size, self.limit)?;
        let cached = self.cached_offset(position, size);
        self.last_read_cached = cached.is_some();
        let offset = match cached {
            Some(offset) => offset,
            None => {
                self.fill(position, size)?;
                0
            }
        };
        Ok(f(&self.buffer[offset..offset + size]))
    }

    pub(crate) fn invalidate_cache(&mut self) {
        self.window = None;
    }

    /// True if the last read was served from a window filled earlier.
    pub(crate) fn last_read_cached(&self) -> bool {
        self.last_read_cached
    }

    fn cached_offset(&self, position: usize, size: usize) -> Option<usize> {
        let window = self.window?;
        if window.epoch != self.epoch.load(Ordering::Acquire) {
            return None;
        }
        let fits = position >= window.start && position + size <= window.start + window.len;
        fits.then(|| position - window.start)
    }

    /// Reads ahead from `position`, at least `size` bytes and at most one
    /// buffer, zero-filling whatever lies past the end of the file.
    fn fill(&mut self, position: usize, size: usize) -> StorageResult<()> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let want = size.max(self.buffer.len()).min(self.limit - position);
        if self.buffer.len() < want {
            self.buffer.resize(want, 0);
        }

        let filled = {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(position as u64))?;
            read_up_to(&mut *file, &mut self.buffer[..want])?
        };
        self.buffer[filled..want].fill(0);

        self.window = Some(Window {
            start: position,
            len: want,
            epoch,
        });
        Ok(())
    }
}

/// Reads until `buf` is full or the file ends, returning the bytes read.
fn read_up_to(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Buffered disk writer.
#[derive(Debug)]
pub struct DiskFileWriter {
    file: Arc<Mutex<File>>,
    limit: usize,
    buffer: Vec<u8>,
    epoch: Arc<AtomicU64>,
}

impl DiskFileWriter {
    pub(crate) fn write(
        &mut self,
        position: usize,
        size: usize,
        f: impl FnOnce(&mut [u8]) -> Option<usize>,
    ) -> StorageResult<Option<usize>> {
        check_bounds(position, size, self.limit)?;
        if self.buffer.len() < size {
            self.buffer.resize(size, 0);
        }

        let window = &mut self.buffer[..size];
        let Some(written) = f(window) else {
            return Ok(None);
        };
        if written > size {
            return Err(StorageError::WriteOverflow {
                written,
                capacity: size,
            });
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(position as u64))?;
        file.write_all(&self.buffer[..written])?;
        Ok(Some(written))
    }

    pub(crate) fn zero(&mut self, position: usize, len: usize) -> StorageResult<()> {
        check_bounds(position, len, self.limit)?;
        if len == 0 {
            return Ok(());
        }

        let chunk = self.buffer.len().max(1).min(len);
        if self.buffer.len() < chunk {
            self.buffer.resize(chunk, 0);
        }
        self.buffer[..chunk].fill(0);
        {
            let mut file = self.file.lock();
            let file_len = file.metadata()?.len();
            // Nothing past the physical end needs zeroing; it already reads as zero.
            let end = (position + len).min(usize::try_from(file_len).unwrap_or(usize::MAX));
            if end > position {
                file.seek(SeekFrom::Start(position as u64))?;
                let mut remaining = end - position;
                while remaining > 0 {
                    let n = remaining.min(chunk);
                    file.write_all(&self.buffer[..n])?;
                    remaining -= n;
                }
            }
        }
        self.epoch.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> StorageResult<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}
