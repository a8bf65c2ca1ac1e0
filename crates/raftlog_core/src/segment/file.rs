//! Segment files on disk.

use super::descriptor::SegmentDescriptor;
use crate::error::JournalResult;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SEGMENT_EXTENSION: &str = "log";

/// Returns the file name of segment `id` of journal `name`.
#[must_use]
pub fn segment_file_name(name: &str, id: u64) -> String {
    format!("{name}-{id}.{SEGMENT_EXTENSION}")
}

/// Recovers the segment id from a segment file path of journal `name`.
///
/// Returns `None` if the path is not one of that journal's segment files.
#[must_use]
pub fn segment_id(name: &str, path: &Path) -> Option<u64> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.strip_suffix(SEGMENT_EXTENSION)?.strip_suffix('.')?;
    let id = stem.strip_prefix(name)?.strip_prefix('-')?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

/// Returns whether `path` names a segment file of journal `name`.
#[must_use]
pub fn is_segment_file(name: &str, path: &Path) -> bool {
    segment_id(name, path).is_some()
}

/// An open segment file and its parsed descriptor.
#[derive(Debug)]
pub struct SegmentFile {
    path: PathBuf,
    descriptor: SegmentDescriptor,
    file: Arc<Mutex<File>>,
}

impl SegmentFile {
    /// Creates a new segment file at `path` and writes `descriptor` to it.
    ///
    /// # Errors
    ///
    /// Fails if the file already exists or cannot be written.
    pub fn create_new(path: &Path, descriptor: SegmentDescriptor) -> JournalResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(&descriptor.to_bytes())?;
        file.sync_all()?;

        Ok(Self {
            path: path.to_path_buf(),
            descriptor,
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Opens an existing segment file and parses its descriptor.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or its descriptor is malformed.
    pub fn open_existing(path: &Path) -> JournalResult<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        file.seek(SeekFrom::Start(0))?;
        let descriptor = SegmentDescriptor::read_from(&mut file)?;

        Ok(Self {
            path: path.to_path_buf(),
            descriptor,
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the parsed descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &SegmentDescriptor {
        &self.descriptor
    }

    /// Returns the segment id.
    #[must_use]
    pub fn segment_id(&self) -> u64 {
        self.descriptor.id()
    }

    /// Returns the maximum segment size recorded in the descriptor.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.descriptor.max_segment_size()
    }

    /// Returns the current physical file size.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file metadata cannot be read.
    pub fn size(&self) -> JournalResult<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    /// Returns the shared file handle used by the storage back-ends.
    pub(crate) fn handle(&self) -> Arc<Mutex<File>> {
        Arc::clone(&self.file)
    }

    /// Removes the file from disk.
    ///
    /// Open handles stay usable until dropped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be removed.
    pub fn delete(&self) -> JournalResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
