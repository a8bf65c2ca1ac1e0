//! Segment descriptor.

use crate::error::{JournalError, JournalResult};
use std::io::{ErrorKind, Read};

/// Size of the descriptor at the head of every segment file.
pub const DESCRIPTOR_BYTES: usize = 64;

/// Current descriptor format version.
pub const DESCRIPTOR_VERSION: i32 = 1;

const VERSION_AT: usize = 0;
const ID_AT: usize = 4;
const FIRST_INDEX_AT: usize = 12;
const MAX_SEGMENT_SIZE_AT: usize = 20;
const MAX_ENTRIES_AT: usize = 24;
const UPDATED_AT: usize = 28;
const LOCKED_AT: usize = 36;

/// Fixed-size header describing one segment file.
///
/// # Layout
///
/// All integers are big-endian:
///
/// ```text
/// | version (4) | id (8) | first_index (8) | max_segment_size (4) |
/// | max_entries (4) | updated (8) | locked (1) | reserved (27) |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor {
    version: i32,
    id: u64,
    first_index: u64,
    max_segment_size: u32,
    max_entries: u32,
    updated: u64,
    locked: bool,
}

impl SegmentDescriptor {
    /// Returns a builder for a new descriptor.
    #[must_use]
    pub fn builder() -> SegmentDescriptorBuilder {
        SegmentDescriptorBuilder::default()
    }

    /// Reads exactly [`DESCRIPTOR_BYTES`] from `reader` and parses them.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::DescriptorTooShort`] if the reader ends early,
    /// or an error from [`Self::from_bytes`].
    pub fn read_from(reader: &mut impl Read) -> JournalResult<Self> {
        let mut buf = [0u8; DESCRIPTOR_BYTES];
        let mut filled = 0;
        while filled < DESCRIPTOR_BYTES {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Self::from_bytes(&buf[..filled])
    }

    /// Parses a descriptor from the first [`DESCRIPTOR_BYTES`] of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::DescriptorTooShort`] if `bytes` is short, or
    /// [`JournalError::InvalidFormat`] for an unknown version.
    pub fn from_bytes(bytes: &[u8]) -> JournalResult<Self> {
        if bytes.len() < DESCRIPTOR_BYTES {
            return Err(JournalError::DescriptorTooShort {
                actual: bytes.len(),
                expected: DESCRIPTOR_BYTES,
            });
        }

        let version = read_i32(bytes, VERSION_AT);
        if version != DESCRIPTOR_VERSION {
            return Err(JournalError::invalid_format(format!(
                "unsupported descriptor version {version}"
            )));
        }

        Ok(Self {
            version,
            id: read_u64(bytes, ID_AT),
            first_index: read_u64(bytes, FIRST_INDEX_AT),
            max_segment_size: read_u32(bytes, MAX_SEGMENT_SIZE_AT),
            max_entries: read_u32(bytes, MAX_ENTRIES_AT),
            updated: read_u64(bytes, UPDATED_AT),
            locked: bytes[LOCKED_AT] == 1,
        })
    }

    /// Serializes the descriptor.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_BYTES] {
        let mut buf = [0u8; DESCRIPTOR_BYTES];
        buf[VERSION_AT..ID_AT].copy_from_slice(&self.version.to_be_bytes());
        buf[ID_AT..FIRST_INDEX_AT].copy_from_slice(&self.id.to_be_bytes());
        buf[FIRST_INDEX_AT..MAX_SEGMENT_SIZE_AT].copy_from_slice(&self.first_index.to_be_bytes());
        buf[MAX_SEGMENT_SIZE_AT..MAX_ENTRIES_AT]
            .copy_from_slice(&self.max_segment_size.to_be_bytes());
        buf[MAX_ENTRIES_AT..UPDATED_AT].copy_from_slice(&self.max_entries.to_be_bytes());
        buf[UPDATED_AT..LOCKED_AT].copy_from_slice(&self.updated.to_be_bytes());
        buf[LOCKED_AT] = u8::from(self.locked);
        buf
    }

    /// Returns the format version.
    #[must_use]
    pub const fn version(&self) -> i32 {
        self.version
    }

    /// Returns the segment id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the index of the first entry in the segment.
    #[must_use]
    pub const fn first_index(&self) -> u64 {
        self.first_index
    }

    /// Returns the maximum segment size in bytes.
    #[must_use]
    pub const fn max_segment_size(&self) -> usize {
        self.max_segment_size as usize
    }

    /// Returns the recorded per-segment entry count. Never consulted.
    #[must_use]
    pub const fn max_entries(&self) -> u32 {
        self.max_entries
    }

    /// Returns the creation time in milliseconds since the Unix epoch.
    #[must_use]
    pub const fn updated(&self) -> u64 {
        self.updated
    }

    /// Returns the reserved locked flag.
    #[must_use]
    pub const fn locked(&self) -> bool {
        self.locked
    }
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_be_bytes(raw)
}

/// Builder for [`SegmentDescriptor`].
///
/// Every field except `locked` must be set explicitly.
#[derive(Debug, Default, Clone)]
pub struct SegmentDescriptorBuilder {
    id: Option<u64>,
    first_index: Option<u64>,
    max_segment_size: Option<usize>,
    max_entries: Option<u32>,
    updated: Option<u64>,
    locked: bool,
}

impl SegmentDescriptorBuilder {
    /// Sets the segment id.
    #[must_use]
    pub const fn id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the first entry index.
    #[must_use]
    pub const fn first_index(mut self, index: u64) -> Self {
        self.first_index = Some(index);
        self
    }

    /// Sets the maximum segment size.
    #[must_use]
    pub const fn max_segment_size(mut self, size: usize) -> Self {
        self.max_segment_size = Some(size);
        self
    }

    /// Sets the recorded per-segment entry count.
    #[must_use]
    pub const fn max_entries(mut self, count: u32) -> Self {
        self.max_entries = Some(count);
        self
    }

    /// Sets the creation time in milliseconds since the Unix epoch.
    #[must_use]
    pub const fn updated(mut self, millis: u64) -> Self {
        self.updated = Some(millis);
        self
    }

    /// Sets the reserved locked flag.
    #[must_use]
    pub const fn locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    /// Builds the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::InvalidConfig`] naming the first field that was
    /// never set, or a maximum segment size that does not fit the format.
    pub fn build(self) -> JournalResult<SegmentDescriptor> {
        let id = self
            .id
            .ok_or_else(|| JournalError::invalid_config("id", "not set"))?;
        let first_index = self
            .first_index
            .ok_or_else(|| JournalError::invalid_config("first_index", "not set"))?;
        let max_segment_size = self
            .max_segment_size
            .ok_or_else(|| JournalError::invalid_config("max_segment_size", "not set"))?;
        let max_entries = self
            .max_entries
            .ok_or_else(|| JournalError::invalid_config("max_entries", "not set"))?;
        let updated = self
            .updated
            .ok_or_else(|| JournalError::invalid_config("updated", "not set"))?;

        let max_segment_size = u32::try_from(max_segment_size)
            .ok()
            .filter(|size| *size <= i32::MAX as u32 && *size as usize > DESCRIPTOR_BYTES)
            .ok_or_else(|| {
                JournalError::invalid_config(
                    "max_segment_size",
                    format!("{max_segment_size} does not fit a segment descriptor"),
                )
            })?;

        Ok(SegmentDescriptor {
            version: DESCRIPTOR_VERSION,
            id,
            first_index,
            max_segment_size,
            max_entries,
            updated,
            locked: self.locked,
        })
    }
}
