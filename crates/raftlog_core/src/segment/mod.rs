//! Journal segments.
//!
//! A segment is one bounded file holding a contiguous run of entries.
//!
//! ## Segment File Format
//!
//! ```text
//! | descriptor (64) | entry | entry | ... | zeros |
//! ```
//!
//! Each entry is framed as:
//!
//! ```text
//! | length (4) | crc32 (4) | payload (length) |
//! ```
//!
//! There is no end marker. The first position that does not decode as a
//! valid entry ends the segment, which is how a torn write at the tail is
//! told apart from real data after a crash.
//!
//! ## Invariants
//!
//! - Entries are contiguous; index `n + 1` follows index `n` directly
//! - Every byte past the last entry reads as zero or as an invalid entry
//! - Only the writer mutates a segment, and there is at most one writer

mod descriptor;
mod entry;
mod file;
mod index;
mod reader;
mod store;
mod writer;

pub use descriptor::{
    SegmentDescriptor, SegmentDescriptorBuilder, DESCRIPTOR_BYTES, DESCRIPTOR_VERSION,
};
pub use entry::{checksum, read_entry, EntryHeader, HEADER_BYTES};
pub use file::{is_segment_file, segment_file_name, segment_id, SegmentFile};
pub use index::{Position, SegmentIndex};
pub use reader::SegmentReader;
pub use store::{Segment, SegmentInfo};
pub use writer::SegmentWriter;
