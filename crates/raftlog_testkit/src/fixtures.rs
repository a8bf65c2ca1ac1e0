//! Test fixtures and journal helpers.
//!
//! Provides temporary journals that clean up after themselves and can be
//! closed and reopened in place to exercise recovery.

use raftlog_core::segment::segment_file_name;
use raftlog_core::{BytesMapper, JournalConfig, JournalResult, SegmentedJournal, StorageLevel};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Journal name used by every fixture.
pub const TEST_JOURNAL_NAME: &str = "test";

/// Segment size small enough to force frequent rollover.
pub const SMALL_SEGMENT_SIZE: usize = 256;

/// Entry size limit paired with [`SMALL_SEGMENT_SIZE`].
pub const SMALL_ENTRY_SIZE: usize = 64;

/// A journal in a temporary directory, deleted on drop.
pub struct TestJournal {
    /// The journal instance.
    pub journal: SegmentedJournal,
    config: JournalConfig,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestJournal {
    /// Creates a journal with default sizes at `level`.
    pub fn new(level: StorageLevel) -> Self {
        Self::with_config(|config| config.storage_level(level))
    }

    /// Creates a journal with 256-byte segments and 64-byte entries, so a
    /// handful of appends spans several segments.
    pub fn small(level: StorageLevel) -> Self {
        Self::with_config(|config| {
            config
                .storage_level(level)
                .max_segment_size(SMALL_SEGMENT_SIZE)
                .max_entry_size(SMALL_ENTRY_SIZE)
                .index_density(0.25)
        })
    }

    /// Creates a journal whose configuration is adjusted by `f`.
    ///
    /// The name and directory are set by the fixture.
    pub fn with_config(f: impl FnOnce(JournalConfig) -> JournalConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = f(JournalConfig::new())
            .name(TEST_JOURNAL_NAME)
            .directory(temp_dir.path());
        let journal = SegmentedJournal::open(config.clone()).expect("Failed to open journal");
        Self {
            journal,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the journal directory.
    pub fn path(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Returns the configuration the journal was opened with.
    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    /// Returns the path of the segment file with `id`.
    pub fn segment_path(&self, id: u64) -> PathBuf {
        self.path().join(segment_file_name(TEST_JOURNAL_NAME, id))
    }

    /// Appends `entries` as raw bytes and returns the index of the last one.
    pub fn append_all<E: AsRef<[u8]>>(&self, entries: &[E]) -> JournalResult<u64> {
        let mut writer = self.journal.writer()?;
        for entry in entries {
            writer.append(&BytesMapper, entry.as_ref())?;
        }
        Ok(writer.next_index() - 1)
    }

    /// Reads every entry from `index` to the end of the journal.
    pub fn read_from(&self, index: u64) -> JournalResult<Vec<(u64, Vec<u8>)>> {
        let mut reader = self.journal.open_reader(index)?;
        let mut entries = Vec::new();
        while let Some(indexed) = reader.next_indexed(&BytesMapper)? {
            entries.push((indexed.index, indexed.entry));
        }
        Ok(entries)
    }

    /// Closes the journal and opens it again from disk.
    pub fn reopen(self) -> JournalResult<Self> {
        let Self {
            journal,
            config,
            _temp_dir,
        } = self;
        journal.close()?;
        Ok(Self {
            journal: SegmentedJournal::open(config.clone())?,
            config,
            _temp_dir,
        })
    }

    /// Closes the journal, runs `f` on the directory while nothing holds
    /// it open, then reopens.
    pub fn reopen_after(self, f: impl FnOnce(&Path)) -> JournalResult<Self> {
        let Self {
            journal,
            config,
            _temp_dir,
        } = self;
        journal.close()?;
        f(_temp_dir.path());
        Ok(Self {
            journal: SegmentedJournal::open(config.clone())?,
            config,
            _temp_dir,
        })
    }
}

impl std::ops::Deref for TestJournal {
    type Target = SegmentedJournal;

    fn deref(&self) -> &Self::Target {
        &self.journal
    }
}

/// Runs a test with a temporary small-segment journal.
///
/// # Example
///
/// ```rust
/// use raftlog_core::StorageLevel;
/// use raftlog_testkit::with_temp_journal;
///
/// with_temp_journal(StorageLevel::Disk, |journal| {
///     assert_eq!(journal.first_index(), 1);
/// });
/// ```
pub fn with_temp_journal<F, R>(level: StorageLevel, f: F) -> R
where
    F: FnOnce(&SegmentedJournal) -> R,
{
    let test_journal = TestJournal::small(level);
    f(&test_journal.journal)
}

/// Returns a payload of `len` bytes derived from `index`.
///
/// Distinct indexes produce distinct payloads, so a misplaced read is
/// caught by comparing bytes.
pub fn payload(index: u64, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (index as usize).wrapping_mul(31).wrapping_add(i) as u8)
        .collect()
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a small-segment journal holding `count` entries of `len`
    /// bytes built by [`payload`].
    pub fn populated_journal(level: StorageLevel, count: u64, len: usize) -> TestJournal {
        let test_journal = TestJournal::small(level);
        let entries: Vec<Vec<u8>> = (1..=count).map(|i| payload(i, len)).collect();
        test_journal
            .append_all(&entries)
            .expect("Failed to append entries");
        test_journal
    }
}
