//! Journal configuration.

use crate::error::{JournalError, JournalResult};
use crate::segment::DESCRIPTOR_BYTES;
use raftlog_storage::StorageLevel;
use std::path::PathBuf;

/// Default journal name.
pub const DEFAULT_NAME: &str = "atomix";
/// Default maximum segment size (32 MiB).
pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 32 * 1024 * 1024;
/// Default maximum entry size (1 MiB).
pub const DEFAULT_MAX_ENTRY_SIZE: usize = 1024 * 1024;
/// Default and upper bound of the vestigial per-segment entry count.
pub const DEFAULT_MAX_ENTRIES_PER_SEGMENT: u32 = 1024 * 1024;
/// Default sparse index density.
pub const DEFAULT_INDEX_DENSITY: f64 = 0.005;

/// Configuration for opening a journal.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Journal name, used as the segment file prefix.
    pub name: String,

    /// How segment files are accessed.
    pub storage_level: StorageLevel,

    /// Directory holding the segment files.
    pub directory: PathBuf,

    /// Maximum size of a segment file, descriptor included.
    pub max_segment_size: usize,

    /// Maximum size of a single entry payload.
    pub max_entry_size: usize,

    /// Recorded in segment descriptors for file compatibility. Has no effect.
    pub max_entries_per_segment: u32,

    /// Fraction of entries whose position is kept in the sparse index.
    pub index_density: f64,

    /// Whether `EntryWriter::commit` flushes the current segment.
    pub flush_on_commit: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            storage_level: StorageLevel::Disk,
            directory: PathBuf::from("."),
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            max_entries_per_segment: DEFAULT_MAX_ENTRIES_PER_SEGMENT,
            index_density: DEFAULT_INDEX_DENSITY,
            flush_on_commit: false,
        }
    }
}

impl JournalConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the journal name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the storage level.
    #[must_use]
    pub const fn storage_level(mut self, level: StorageLevel) -> Self {
        self.storage_level = level;
        self
    }

    /// Sets the journal directory.
    #[must_use]
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Sets the maximum segment size in bytes.
    #[must_use]
    pub const fn max_segment_size(mut self, size: usize) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets the maximum entry size in bytes.
    #[must_use]
    pub const fn max_entry_size(mut self, size: usize) -> Self {
        self.max_entry_size = size;
        self
    }

    /// Sets the vestigial per-segment entry count.
    #[must_use]
    pub const fn max_entries_per_segment(mut self, count: u32) -> Self {
        self.max_entries_per_segment = count;
        self
    }

    /// Sets the sparse index density.
    #[must_use]
    pub const fn index_density(mut self, density: f64) -> Self {
        self.index_density = density;
        self
    }

    /// Sets whether commits flush the current segment.
    #[must_use]
    pub const fn flush_on_commit(mut self, value: bool) -> Self {
        self.flush_on_commit = value;
        self
    }

    /// Checks every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> JournalResult<()> {
        if self.name.is_empty() {
            return Err(JournalError::invalid_config("name", "must not be empty"));
        }
        if self.name.contains(['/', '\\']) {
            return Err(JournalError::invalid_config(
                "name",
                "must not contain path separators",
            ));
        }
        if self.max_segment_size <= DESCRIPTOR_BYTES {
            return Err(JournalError::invalid_config(
                "max_segment_size",
                format!("must be greater than {DESCRIPTOR_BYTES}"),
            ));
        }
        if self.max_segment_size > i32::MAX as usize {
            return Err(JournalError::invalid_config(
                "max_segment_size",
                format!("must not exceed {}", i32::MAX),
            ));
        }
        if self.max_entry_size == 0 {
            return Err(JournalError::invalid_config(
                "max_entry_size",
                "must be positive",
            ));
        }
        if self.max_entry_size > i32::MAX as usize {
            return Err(JournalError::invalid_config(
                "max_entry_size",
                format!("must not exceed {}", i32::MAX),
            ));
        }
        if self.max_entries_per_segment == 0
            || self.max_entries_per_segment > DEFAULT_MAX_ENTRIES_PER_SEGMENT
        {
            return Err(JournalError::invalid_config(
                "max_entries_per_segment",
                format!("must be in 1..={DEFAULT_MAX_ENTRIES_PER_SEGMENT}"),
            ));
        }
        if !(self.index_density > 0.0 && self.index_density < 1.0) {
            return Err(JournalError::invalid_config(
                "index_density",
                "must be between 0 and 1",
            ));
        }
        Ok(())
    }
}
