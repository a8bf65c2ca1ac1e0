//! Memory-mapped back-end.

use crate::error::{check_bounds, StorageError, StorageResult};
use memmap2::{MmapMut, MmapOptions};
use parking_lot::RwLock;
use std::fs::File;
use std::sync::Arc;

/// Mapped access to one segment file.
///
/// The file is grown to the segment limit and mapped whole. Readers and the
/// writer share the mapping, so every write is visible to every reader as
/// soon as the writer releases the lock.
#[derive(Debug, Clone)]
pub struct MappedFileAccess {
    map: Arc<RwLock<MmapMut>>,
    limit: usize,
}

impl MappedFileAccess {
    pub(crate) fn open(file: &File, limit: usize) -> StorageResult<Self> {
        let len = file.metadata()?.len();
        if len < limit as u64 {
            file.set_len(limit as u64)?;
        }

        // SAFETY: the mapping never outlives the segment it belongs to, and
        // segment files are only modified through this process's accessors.
        // Every access is bounds-checked against `limit`, which is within the
        // file length set above.
        #[allow(unsafe_code)]
        let map = unsafe { MmapOptions::new().len(limit).map_mut(file)? };

        Ok(Self {
            map: Arc::new(RwLock::new(map)),
            limit,
        })
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    pub(crate) fn flush(&self) -> StorageResult<()> {
        self.map.read().flush()?;
        Ok(())
    }

    pub(crate) fn reader(&self) -> MappedFileReader {
        MappedFileReader {
            map: Arc::clone(&self.map),
            limit: self.limit,
        }
    }

    pub(crate) fn writer(&self) -> MappedFileWriter {
        MappedFileWriter {
            map: Arc::clone(&self.map),
            limit: self.limit,
        }
    }
}

/// Reader over a shared mapping.
#[derive(Debug)]
pub struct MappedFileReader {
    map: Arc<RwLock<MmapMut>>,
    limit: usize,
}

impl MappedFileReader {
    pub(crate) fn read<R>(
        &mut self,
        position: usize,
        size: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> StorageResult<R> {
        check_bounds(position, size, self.limit)?;
        let map = self.map.read();
        Ok(f(&map[position..position + size]))
    }
}

/// Writer over a shared mapping.
#[derive(Debug)]
pub struct MappedFileWriter {
    map: Arc<RwLock<MmapMut>>,
    limit: usize,
}

impl MappedFileWriter {
    pub(crate) fn write(
        &mut self,
        position: usize,
        size: usize,
        f: impl FnOnce(&mut [u8]) -> Option<usize>,
    ) -> StorageResult<Option<usize>> {
        check_bounds(position, size, self.limit)?;
        let mut map = self.map.write();
        let window = &mut map[position..position + size];
        match f(window) {
            Some(written) if written > size => {
                window.fill(0);
                Err(StorageError::WriteOverflow {
                    written,
                    capacity: size,
                })
            }
            Some(written) => Ok(Some(written)),
            None => {
                // The callback wrote in place; undo whatever it left behind.
                window.fill(0);
                Ok(None)
            }
        }
    }

    pub(crate) fn zero(&mut self, position: usize, len: usize) -> StorageResult<()> {
        check_bounds(position, len, self.limit)?;
        self.map.write()[position..position + len].fill(0);
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> StorageResult<()> {
        self.map.read().flush()?;
        Ok(())
    }
}
