//! The journal: a chain of segments with one writer and many readers.
//!
//! ## Lock Order
//!
//! ```text
//! reader registry -> reader cursor -> segment map -> segment index -> file
//! ```
//!
//! The directory handle is a leaf lock, taken briefly and never held while
//! acquiring another.

mod reader;
mod segmented;
mod writer;

pub use reader::EntryReader;
pub use segmented::SegmentedJournal;
pub use writer::EntryWriter;
