//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod inspect;
pub mod verify;

use crate::error::{CliError, CliResult};
use raftlog_core::segment::Segment;
use raftlog_core::{
    list_segment_files, JournalConfig, JournalResult, SegmentFile, StorageLevel,
    DEFAULT_INDEX_DENSITY,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The journal a command operates on.
#[derive(Debug, Clone)]
pub struct Target {
    /// Journal directory.
    pub path: PathBuf,
    /// Journal name.
    pub name: String,
    /// Maximum entry size the journal was written with.
    pub max_entry_size: usize,
}

impl Target {
    /// Returns the configuration for opening the journal for writing.
    pub fn config(&self) -> JournalConfig {
        JournalConfig::new()
            .name(self.name.clone())
            .directory(self.path.clone())
            .max_entry_size(self.max_entry_size)
    }

    /// Lists the journal's segment files, failing if there are none.
    pub fn segment_files(&self) -> CliResult<Vec<(u64, PathBuf)>> {
        if !self.path.is_dir() {
            return Err(self.no_journal());
        }
        let files = list_segment_files(&self.path, &self.name)?;
        if files.is_empty() {
            return Err(self.no_journal());
        }
        Ok(files)
    }

    fn no_journal(&self) -> CliError {
        CliError::NoJournal {
            path: self.path.clone(),
            name: self.name.clone(),
        }
    }

    /// Opens every segment without locking the journal, ordered by first
    /// index. Nothing is repaired or deleted.
    pub fn open_segments(&self) -> CliResult<Vec<Arc<Segment>>> {
        let mut segments = Vec::new();
        for (_, path) in self.segment_files()? {
            segments.push(open_segment(&path, self.max_entry_size)?);
        }
        segments.sort_by_key(|segment| (segment.first_index(), segment.id()));
        Ok(segments)
    }
}

/// Opens one segment file at the disk level and scans its entries.
pub fn open_segment(path: &Path, max_entry_size: usize) -> JournalResult<Arc<Segment>> {
    let file = SegmentFile::open_existing(path)?;
    Segment::open(
        file,
        StorageLevel::Disk,
        max_entry_size,
        DEFAULT_INDEX_DENSITY,
    )
}

/// Formats a byte count for display.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
