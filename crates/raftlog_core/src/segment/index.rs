//! Sparse in-memory index of entry positions.

use std::collections::BTreeMap;

/// An entry's logical index and its byte offset in the segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Logical entry index.
    pub index: u64,
    /// Byte offset of the entry header.
    pub position: usize,
}

/// Maps a fraction of a segment's entries to their file positions.
///
/// Only indexes divisible by the stride are recorded, plus the last entry
/// seen. Anything else is found by scanning forward from [`Self::lookup`].
#[derive(Debug, Clone)]
pub struct SegmentIndex {
    stride: u64,
    positions: BTreeMap<u64, usize>,
    last: Option<Position>,
}

impl SegmentIndex {
    /// Creates an empty index recording roughly `density` of all entries.
    #[must_use]
    pub fn new(density: f64) -> Self {
        let stride = (1.0 / density).ceil();
        let stride = if stride.is_finite() && stride >= 1.0 {
            stride as u64
        } else {
            1
        };
        Self {
            stride,
            positions: BTreeMap::new(),
            last: None,
        }
    }

    /// Returns the gap between recorded indexes.
    #[must_use]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Records that entry `index` starts at `position`.
    ///
    /// Entries must be recorded in increasing order.
    pub fn index(&mut self, index: u64, position: usize) {
        debug_assert!(self.last.map_or(true, |last| last.index < index));
        if index % self.stride == 0 {
            self.positions.insert(index, position);
        }
        self.last = Some(Position { index, position });
    }

    /// Returns the last recorded entry.
    #[must_use]
    pub fn last(&self) -> Option<Position> {
        self.last
    }

    /// Returns the closest known position at or below `index`.
    #[must_use]
    pub fn lookup(&self, index: u64) -> Option<Position> {
        if let Some(last) = self.last {
            if last.index <= index {
                return Some(last);
            }
        }
        self.positions
            .range(..=index)
            .next_back()
            .map(|(&index, &position)| Position { index, position })
    }

    /// Forgets every entry after `index`.
    ///
    /// Returns the closest known position at or below `index`, which becomes
    /// the new last entry. The caller must re-record the entries between it
    /// and `index`.
    pub fn truncate(&mut self, index: u64) -> Option<Position> {
        if self.last.map_or(true, |last| last.index <= index) {
            return self.last;
        }
        self.positions.split_off(&(index + 1));
        self.last = self
            .positions
            .iter()
            .next_back()
            .map(|(&index, &position)| Position { index, position });
        self.last
    }

    /// Returns the number of recorded positions, the last entry aside.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns whether no entry has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last.is_none()
    }
}
