//! Benchmark utilities.

use raftlog_core::{BytesMapper, JournalConfig, SegmentedJournal, StorageLevel};
use rand::Rng;
use tempfile::TempDir;

/// Generate random entry data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a batch of random entries.
pub fn generate_entries(count: usize, payload_size: usize) -> Vec<Vec<u8>> {
    (0..count).map(|_| random_data(payload_size)).collect()
}

/// Opens a journal in a fresh temporary directory.
///
/// The directory must outlive the journal.
pub fn temp_journal(level: StorageLevel, max_segment_size: usize) -> (TempDir, SegmentedJournal) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config = JournalConfig::new()
        .name("bench")
        .directory(temp_dir.path())
        .storage_level(level)
        .max_segment_size(max_segment_size);
    let journal = SegmentedJournal::open(config).expect("Failed to open journal");
    (temp_dir, journal)
}

/// Opens a journal and fills it with `count` entries of `payload_size` bytes.
pub fn populated_journal(
    level: StorageLevel,
    max_segment_size: usize,
    count: usize,
    payload_size: usize,
) -> (TempDir, SegmentedJournal) {
    let (temp_dir, journal) = temp_journal(level, max_segment_size);
    {
        let mut writer = journal.writer().expect("Failed to acquire writer");
        for entry in generate_entries(count, payload_size) {
            writer
                .append(&BytesMapper, entry.as_slice())
                .expect("Failed to append");
        }
        writer.flush().expect("Failed to flush");
    }
    (temp_dir, journal)
}
