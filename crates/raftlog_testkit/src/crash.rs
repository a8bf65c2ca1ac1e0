//! Crash recovery testing for raftlog.
//!
//! A crash is simulated by closing a journal, damaging its segment files the
//! way an interrupted write or a failing disk would, and reopening it. The
//! reopened journal must keep exactly the entries before the first damaged
//! one, all intact.
//!
//! ## Usage
//!
//! ```rust
//! use raftlog_core::StorageLevel;
//! use raftlog_testkit::crash::{CrashPoint, CrashRecoveryHarness};
//!
//! let mut harness = CrashRecoveryHarness::new(StorageLevel::Disk);
//! let result = harness.run(CrashPoint::TornHeader);
//! assert!(result.passed, "{:?}", result.error);
//! ```

use crate::fixtures::{payload, scenarios, TEST_JOURNAL_NAME};
use raftlog_core::segment::{Segment, HEADER_BYTES};
use raftlog_core::{
    list_segment_files, BytesMapper, JournalError, JournalResult, SegmentFile, StorageLevel,
    DEFAULT_INDEX_DENSITY,
};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Kinds of damage a crash can leave behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// The checksum of the last entry is garbage.
    TornHeader,
    /// One bit of an entry's payload in the middle of the journal flipped.
    FlippedPayloadBit,
    /// The last segment file ends partway through the last entry.
    TruncatedTail,
    /// The last two entries never reached the disk.
    ZeroedTail,
    /// A segment file in the middle of the chain is missing.
    MissingSegment,
}

impl CrashPoint {
    /// Every crash point.
    pub const ALL: [CrashPoint; 5] = [
        CrashPoint::TornHeader,
        CrashPoint::FlippedPayloadBit,
        CrashPoint::TruncatedTail,
        CrashPoint::ZeroedTail,
        CrashPoint::MissingSegment,
    ];
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// The damage simulated.
    pub point: CrashPoint,
    /// Expected last index after recovery.
    pub expected_last_index: u64,
    /// Actual last index after recovery.
    pub actual_last_index: u64,
    /// Any error message.
    pub error: Option<String>,
}

/// Where one entry lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryLocation {
    /// Journal index.
    pub index: u64,
    /// Segment file holding the entry.
    pub path: PathBuf,
    /// Offset of the entry header.
    pub offset: u64,
    /// Payload length.
    pub length: usize,
}

impl EntryLocation {
    /// Offset of the first payload byte.
    pub fn payload_offset(&self) -> u64 {
        self.offset + HEADER_BYTES as u64
    }

    /// Offset just past the entry.
    pub fn end(&self) -> u64 {
        self.payload_offset() + self.length as u64
    }
}

/// Lists every readable entry of journal `name` in `dir`, in index order.
///
/// The journal must not be open.
pub fn locate_entries(
    dir: &Path,
    name: &str,
    max_entry_size: usize,
) -> JournalResult<Vec<EntryLocation>> {
    let mut entries = Vec::new();
    for (_, path) in list_segment_files(dir, name)? {
        let file = SegmentFile::open_existing(&path)?;
        let segment = Segment::open(
            file,
            StorageLevel::Disk,
            max_entry_size,
            DEFAULT_INDEX_DENSITY,
        )?;
        let mut reader = segment.reader();
        let mut index = segment.first_index();
        loop {
            let offset = reader.position() as u64;
            let Some(length) = reader.next_entry(|bytes| bytes.len())? else {
                break;
            };
            entries.push(EntryLocation {
                index,
                path: path.clone(),
                offset,
                length,
            });
            index += 1;
        }
    }
    entries.sort_by_key(|entry| entry.index);
    Ok(entries)
}

/// Overwrites bytes of `path` at `offset`.
pub fn overwrite(path: &Path, offset: u64, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Flips bit `bit` of the byte at `offset`.
pub fn flip_bit(path: &Path, offset: u64, bit: u8) -> std::io::Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte)?;
    byte[0] ^= 1 << (bit % 8);
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&byte)?;
    file.sync_all()
}

/// Cuts `path` down to `len` bytes.
pub fn truncate_file(path: &Path, len: u64) -> std::io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    file.sync_all()
}

/// Test harness for crash recovery scenarios.
pub struct CrashRecoveryHarness {
    /// Storage level the journal is written and reopened with.
    pub level: StorageLevel,
    /// Number of entries written before the crash.
    pub entries: u64,
    /// Payload length of every entry.
    pub entry_len: usize,
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a harness writing 14 entries of 30 bytes, which spans three
    /// small segments.
    pub fn new(level: StorageLevel) -> Self {
        Self {
            level,
            entries: 14,
            entry_len: 30,
            results: Vec::new(),
        }
    }

    /// Runs every crash point and returns whether all passed.
    pub fn run_all(&mut self) -> bool {
        CrashPoint::ALL
            .iter()
            .all(|&point| self.run(point).passed)
    }

    /// Simulates `point` and checks recovery.
    pub fn run(&mut self, point: CrashPoint) -> CrashRecoveryResult {
        let result = match self.simulate(point) {
            Ok((expected, actual)) if expected == actual.0 => CrashRecoveryResult {
                passed: actual.1.is_none(),
                point,
                expected_last_index: expected,
                actual_last_index: actual.0,
                error: actual.1,
            },
            Ok((expected, actual)) => CrashRecoveryResult {
                passed: false,
                point,
                expected_last_index: expected,
                actual_last_index: actual.0,
                error: Some(format!(
                    "expected last index {expected}, found {}",
                    actual.0
                )),
            },
            Err(e) => CrashRecoveryResult {
                passed: false,
                point,
                expected_last_index: 0,
                actual_last_index: 0,
                error: Some(e.to_string()),
            },
        };
        self.results.push(result.clone());
        result
    }

    /// Returns the expected last index and the recovered last index with
    /// any data mismatch found.
    fn simulate(&self, point: CrashPoint) -> JournalResult<(u64, (u64, Option<String>))> {
        let journal = scenarios::populated_journal(self.level, self.entries, self.entry_len);
        let max_entry_size = journal.config().max_entry_size;
        let mut expected = 0;

        let journal = journal.reopen_after(|dir| {
            expected = damage(dir, point, max_entry_size).unwrap_or(u64::MAX);
        })?;
        if expected == u64::MAX {
            return Err(JournalError::invalid_operation(format!(
                "could not apply {point:?}"
            )));
        }

        let last_index = journal.last_index();
        let entries = journal.read_from(1)?;
        let mut mismatch = None;
        if entries.len() as u64 != last_index {
            mismatch = Some(format!(
                "read {} entries up to last index {last_index}",
                entries.len()
            ));
        } else if let Some((index, _)) = entries
            .iter()
            .find(|(index, bytes)| *bytes != payload(*index, self.entry_len))
        {
            mismatch = Some(format!("entry {index} changed"));
        }

        if mismatch.is_none() {
            let mut writer = journal.writer()?;
            writer.append(&BytesMapper, &payload(last_index + 1, self.entry_len))?;
            if journal.last_index() != last_index + 1 {
                mismatch = Some("append after recovery did not extend the journal".to_string());
            }
        }

        Ok((expected, (last_index, mismatch)))
    }
}

/// Applies `point` to the closed journal in `dir` and returns the last index
/// that must survive.
fn damage(dir: &Path, point: CrashPoint, max_entry_size: usize) -> JournalResult<u64> {
    let entries = locate_entries(dir, TEST_JOURNAL_NAME, max_entry_size)?;
    let Some(last) = entries.last() else {
        return Err(JournalError::invalid_operation("journal is empty"));
    };

    match point {
        CrashPoint::TornHeader => {
            overwrite(&last.path, last.offset + 4, &[0xde, 0xad, 0xbe, 0xef])?;
            Ok(last.index - 1)
        }
        CrashPoint::FlippedPayloadBit => {
            let target = &entries[entries.len() / 2];
            flip_bit(&target.path, target.payload_offset() + 3, 5)?;
            Ok(target.index - 1)
        }
        CrashPoint::TruncatedTail => {
            truncate_file(&last.path, last.payload_offset() + last.length as u64 / 2)?;
            Ok(last.index - 1)
        }
        CrashPoint::ZeroedTail => {
            for entry in entries.iter().rev().take(2) {
                let len = (entry.end() - entry.offset) as usize;
                overwrite(&entry.path, entry.offset, &vec![0u8; len])?;
            }
            Ok(last.index.saturating_sub(2))
        }
        CrashPoint::MissingSegment => {
            let first_path = &entries[0].path;
            let Some(second) = entries.iter().find(|e| e.path != *first_path) else {
                return Err(JournalError::invalid_operation("journal has one segment"));
            };
            fs::remove_file(&second.path)?;
            Ok(second.index - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_crash_point_recovers() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let mut harness = CrashRecoveryHarness::new(level);
            let passed = harness.run_all();
            assert!(passed, "{level}: {:?}", harness.results);
            assert_eq!(harness.results.len(), CrashPoint::ALL.len());
        }
    }

    #[test]
    fn test_locate_entries_spans_segments() {
        let journal = scenarios::populated_journal(StorageLevel::Disk, 10, 40);
        let max_entry_size = journal.config().max_entry_size;
        let journal = journal
            .reopen_after(|dir| {
                let entries = locate_entries(dir, TEST_JOURNAL_NAME, max_entry_size).unwrap();
                assert_eq!(entries.len(), 10);
                assert_eq!(entries[4].offset, 64);
                assert_ne!(entries[3].path, entries[4].path);
                assert!(entries.iter().all(|e| e.length == 40));
            })
            .unwrap();
        assert_eq!(journal.last_index(), 10);
    }

    #[test]
    fn test_single_crash_point_reports_indexes() {
        let mut harness = CrashRecoveryHarness::new(StorageLevel::Disk);
        let result = harness.run(CrashPoint::ZeroedTail);
        assert!(result.passed, "{:?}", result.error);
        assert_eq!(result.expected_last_index, 12);
        assert_eq!(result.actual_last_index, 12);
    }
}
