//! Journal directory management.
//!
//! A journal lives in a directory shared with any number of other journals,
//! distinguished by name:
//!
//! ```text
//! <directory>/
//! ├─ <name>.lock       # Advisory lock for single-process access
//! ├─ <name>-1.log      # Segment files, one per segment id
//! ├─ <name>-2.log
//! └─ ...
//! ```

use crate::error::{JournalError, JournalResult};
use crate::segment::{segment_file_name, segment_id};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Holds the exclusive lock on one journal within a directory.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub struct JournalDir {
    /// Directory path.
    path: PathBuf,
    /// Journal name.
    name: String,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl JournalDir {
    /// Opens the journal directory, creating it if needed, and locks it.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::JournalLocked`] if another process holds the
    /// lock, or an I/O error if the directory cannot be created.
    pub fn open(path: &Path, name: &str) -> JournalResult<Self> {
        fs::create_dir_all(path)?;
        if !path.is_dir() {
            return Err(JournalError::invalid_config(
                "directory",
                format!("not a directory: {}", path.display()),
            ));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(format!("{name}.lock")))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(JournalError::JournalLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            name: name.to_string(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the segment file with the given id.
    #[must_use]
    pub fn segment_path(&self, id: u64) -> PathBuf {
        self.path.join(segment_file_name(&self.name, id))
    }

    /// Lists this journal's segment files, ordered by segment id.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be read.
    pub fn segment_files(&self) -> JournalResult<Vec<(u64, PathBuf)>> {
        list_segment_files(&self.path, &self.name)
    }

    /// Syncs the directory so file creations and deletions are durable.
    #[cfg(unix)]
    pub fn sync(&self) -> JournalResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    /// Syncs the directory so file creations and deletions are durable.
    #[cfg(not(unix))]
    pub fn sync(&self) -> JournalResult<()> {
        // NTFS journals metadata; there is no directory handle to sync.
        Ok(())
    }
}

/// Lists the segment files of journal `name` in `dir`, ordered by segment id.
///
/// Works without taking the journal lock, for read-only tooling.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be read.
pub fn list_segment_files(dir: &Path, name: &str) -> JournalResult<Vec<(u64, PathBuf)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if let Some(id) = segment_id(name, &path) {
            files.push((id, path));
        }
    }
    files.sort_by_key(|(id, _)| *id);
    Ok(files)
}
