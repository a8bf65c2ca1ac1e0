//! Entry framing.
//!
//! ```text
//! | length (4, BE) | crc32 (4, BE) | payload (length) |
//! ```
//!
//! A zero or out-of-range length, or a checksum that does not match the
//! payload, means there is no entry at that position.

use crate::error::JournalResult;
use raftlog_storage::FileReader;
use tracing::trace;

/// Size of the per-entry header.
pub const HEADER_BYTES: usize = 8;

/// Computes the checksum stored in an entry header.
#[must_use]
pub fn checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// Parsed entry header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    /// Payload length in bytes. Signed on disk.
    pub length: i32,
    /// CRC-32 of the payload.
    pub checksum: u32,
}

impl EntryHeader {
    /// Builds the header for `payload`.
    #[must_use]
    pub fn for_payload(payload: &[u8]) -> Self {
        Self {
            length: i32::try_from(payload.len()).unwrap_or(i32::MAX),
            checksum: checksum(payload),
        }
    }

    /// Parses a header from the first [`HEADER_BYTES`] of `bytes`.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        Self {
            length: i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            checksum: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }

    /// Writes the header into the first [`HEADER_BYTES`] of `out`.
    pub fn encode(&self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.length.to_be_bytes());
        out[4..HEADER_BYTES].copy_from_slice(&self.checksum.to_be_bytes());
    }

    /// Returns whether the length is in `1..=max_length`.
    ///
    /// A negative length is never valid, whatever `max_length` is.
    #[must_use]
    pub fn has_valid_length(&self, max_length: usize) -> bool {
        usize::try_from(self.length).map_or(false, |length| length > 0 && length <= max_length)
    }
}

/// Reads and verifies the entry at `position`, passing its payload to `f`.
///
/// Returns the payload length and what `f` returned, or `None` if there is
/// no valid entry at `position`. The reader's cache is dropped on `None` so a
/// later attempt sees fresh data.
///
/// # Errors
///
/// Returns storage errors only; invalid framing is `None`.
pub fn read_entry<R>(
    reader: &mut FileReader,
    position: usize,
    limit: usize,
    max_entry_size: usize,
    f: impl FnOnce(&[u8]) -> R,
) -> JournalResult<Option<(usize, R)>> {
    let Some(remaining) = limit.checked_sub(position + HEADER_BYTES) else {
        return Ok(None);
    };

    let header = reader.read(position, HEADER_BYTES, EntryHeader::decode)?;
    if !header.has_valid_length(remaining.min(max_entry_size)) {
        trace!(position, length = header.length, "no entry: invalid length");
        reader.invalidate_cache();
        return Ok(None);
    }

    let length = header.length as usize;
    let result = reader.read(position + HEADER_BYTES, length, |payload| {
        (checksum(payload) == header.checksum).then(|| f(payload))
    })?;

    match result {
        Some(value) => Ok(Some((length, value))),
        None => {
            trace!(position, length, "no entry: checksum mismatch");
            reader.invalidate_cache();
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use raftlog_storage::{FileAccess, StorageLevel};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn access(level: StorageLevel) -> (tempfile::TempDir, FileAccess) {
        let dir = tempdir().unwrap();
        let file = tempfile::tempfile_in(dir.path()).unwrap();
        let access = FileAccess::open(level, Arc::new(Mutex::new(file)), 1024, 256).unwrap();
        (dir, access)
    }

    fn write_raw(access: &FileAccess, position: usize, bytes: &[u8]) {
        access
            .writer()
            .write(position, bytes.len(), |buf| {
                buf.copy_from_slice(bytes);
                Some(bytes.len())
            })
            .unwrap();
    }

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0; HEADER_BYTES + payload.len()];
        EntryHeader::for_payload(payload).encode(&mut out);
        out[HEADER_BYTES..].copy_from_slice(payload);
        out
    }

    #[test]
    fn header_layout() {
        let mut out = [0u8; HEADER_BYTES];
        EntryHeader {
            length: 5,
            checksum: 0xDEAD_BEEF,
        }
        .encode(&mut out);
        assert_eq!(out, [0, 0, 0, 5, 0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(EntryHeader::decode(&out).length, 5);
    }

    #[test]
    fn checksum_is_crc32_ieee() {
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn length_bounds() {
        let header = |length| EntryHeader {
            length,
            checksum: 0,
        };
        assert!(!header(0).has_valid_length(10));
        assert!(header(1).has_valid_length(10));
        assert!(header(10).has_valid_length(10));
        assert!(!header(11).has_valid_length(10));
        assert!(!header(-1).has_valid_length(usize::MAX));
        assert!(!header(i32::MIN).has_valid_length(usize::MAX));
        assert!(header(i32::MAX).has_valid_length(usize::MAX));
    }

    #[test]
    fn reads_valid_entry() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let (_dir, access) = access(level);
            write_raw(&access, 64, &framed(b"payload"));

            let mut reader = access.reader();
            let (length, bytes) = read_entry(&mut reader, 64, 1024, 256, <[u8]>::to_vec)
                .unwrap()
                .unwrap();
            assert_eq!(length, 7);
            assert_eq!(bytes, b"payload");
        }
    }

    #[test]
    fn unwritten_space_is_no_entry() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let (_dir, access) = access(level);
            let mut reader = access.reader();
            assert!(read_entry(&mut reader, 64, 1024, 256, |_| ())
                .unwrap()
                .is_none());
        }
    }

    #[test]
    fn flipped_payload_bit_is_no_entry() {
        let (_dir, access) = access(StorageLevel::Disk);
        let mut bytes = framed(b"payload");
        bytes[HEADER_BYTES + 2] ^= 0x10;
        write_raw(&access, 64, &bytes);

        let mut reader = access.reader();
        assert!(read_entry(&mut reader, 64, 1024, 256, |_| ())
            .unwrap()
            .is_none());
    }

    #[test]
    fn length_past_segment_end_is_no_entry() {
        let (_dir, access) = access(StorageLevel::Disk);
        write_raw(&access, 1000, &framed(&[1; 10]));

        let mut reader = access.reader();
        assert!(read_entry(&mut reader, 1000, 1024, 256, |_| ())
            .unwrap()
            .is_some());
        // Same bytes, but a limit that leaves no room for the payload.
        assert!(read_entry(&mut reader, 1000, 1015, 256, |_| ())
            .unwrap()
            .is_none());
        // Header alone does not fit.
        assert!(read_entry(&mut reader, 1020, 1024, 256, |_| ())
            .unwrap()
            .is_none());
    }

    #[test]
    fn length_over_max_entry_size_is_no_entry() {
        let (_dir, access) = access(StorageLevel::Disk);
        write_raw(&access, 64, &framed(&[1; 100]));

        let mut reader = access.reader();
        assert!(read_entry(&mut reader, 64, 1024, 99, |_| ())
            .unwrap()
            .is_none());
        assert!(read_entry(&mut reader, 64, 1024, 100, |_| ())
            .unwrap()
            .is_some());
    }

    #[test]
    fn negative_length_is_no_entry() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            let (_dir, access) = access(level);
            let mut bytes = framed(&[7; 16]);
            bytes[0] |= 0x80;
            write_raw(&access, 64, &bytes);

            let mut reader = access.reader();
            assert!(
                read_entry(&mut reader, 64, 1024, usize::MAX, |_| ())
                    .unwrap()
                    .is_none(),
                "{level}"
            );
        }
    }
}
