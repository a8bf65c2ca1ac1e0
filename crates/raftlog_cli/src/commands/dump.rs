//! Dump command implementation.

use super::Target;
use crate::error::CliResult;
use raftlog_core::segment::checksum;
use serde::Serialize;

/// Bytes of payload shown per entry.
const PREVIEW_BYTES: usize = 16;

/// Entry representation for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Journal index.
    pub index: u64,
    /// Segment holding the entry.
    pub segment: u64,
    /// Byte offset of the entry header within the segment.
    pub offset: usize,
    /// Payload length in bytes.
    pub length: usize,
    /// Payload CRC-32, hex-encoded.
    pub checksum: String,
    /// Leading payload bytes, hex-encoded.
    pub preview: String,
}

/// Reads up to `limit` entries starting at index `from`.
pub fn read_entries(target: &Target, from: u64, limit: Option<usize>) -> CliResult<Vec<EntryInfo>> {
    let limit = limit.unwrap_or(usize::MAX);
    let mut entries = Vec::new();

    for segment in target.open_segments()? {
        if entries.len() >= limit {
            break;
        }
        if segment.last_index() < from {
            continue;
        }

        let mut reader = segment.reader();
        let mut index = segment.first_index();
        if let Some(position) = segment.lookup(from) {
            if position.index >= index {
                reader.set_position(position.position)?;
                index = position.index;
            }
        }

        while entries.len() < limit && index <= segment.last_index() {
            let offset = reader.position();
            let Some((length, crc, preview)) = reader.next_entry(|bytes| {
                (
                    bytes.len(),
                    checksum(bytes),
                    hex_encode(&bytes[..bytes.len().min(PREVIEW_BYTES)]),
                )
            })?
            else {
                break;
            };

            if index >= from {
                entries.push(EntryInfo {
                    index,
                    segment: segment.id(),
                    offset,
                    length,
                    checksum: format!("{:08x}", crc),
                    preview,
                });
            }
            index += 1;
        }
    }

    Ok(entries)
}

/// Runs the dump command.
pub fn run(target: &Target, from: u64, limit: Option<usize>, format: &str) -> CliResult<()> {
    let entries = read_entries(target, from, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            print_text_output(&entries);
        }
    }

    Ok(())
}

fn print_text_output(entries: &[EntryInfo]) {
    println!("Journal Entries ({} total)", entries.len());
    println!("====================");
    println!();

    for entry in entries {
        println!(
            "[{:>10}] segment={} offset={} len={} crc={} {}{}",
            entry.index,
            entry.segment,
            entry.offset,
            entry.length,
            entry.checksum,
            entry.preview,
            if entry.length > PREVIEW_BYTES { "..." } else { "" }
        );
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::journal_with_entries;
    use tempfile::tempdir;

    #[test]
    fn dumps_from_index_across_segments() {
        let dir = tempdir().unwrap();
        let target = journal_with_entries(&dir, 10);

        let entries = read_entries(&target, 3, None).unwrap();
        assert_eq!(entries.len(), 8);
        assert_eq!(entries[0].index, 3);
        assert_eq!(entries[0].segment, 1);
        assert_eq!(entries[2].index, 5);
        assert_eq!(entries[2].segment, 2);
        assert_eq!(entries[2].offset, 64);
        assert_eq!(entries[2].length, 40);
        assert_eq!(entries[2].preview, "05".repeat(PREVIEW_BYTES));
    }

    #[test]
    fn limit_caps_output() {
        let dir = tempdir().unwrap();
        let target = journal_with_entries(&dir, 10);

        let entries = read_entries(&target, 1, Some(3)).unwrap();
        let indexes: Vec<u64> = entries.iter().map(|e| e.index).collect();
        assert_eq!(indexes, vec![1, 2, 3]);
    }

    #[test]
    fn index_past_end_is_empty() {
        let dir = tempdir().unwrap();
        let target = journal_with_entries(&dir, 4);
        assert!(read_entries(&target, 5, None).unwrap().is_empty());
    }
}
