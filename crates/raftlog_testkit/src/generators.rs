//! Property-based test generators using proptest.
//!
//! Provides strategies for generating entry payloads and sequences of
//! journal operations.

use proptest::prelude::*;

/// Strategy for generating entry payloads of 1 to `max_len` bytes.
///
/// The framing cannot represent an empty entry, so payloads are never empty.
pub fn payload_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=max_len.max(1))
}

/// Strategy for generating a batch of payloads.
pub fn payloads_strategy(max_len: usize, max_count: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(payload_strategy(max_len), 0..=max_count)
}

/// Strategy for generating index densities in the valid open interval.
pub fn index_density_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![Just(0.005), Just(0.1), Just(0.5), 0.01f64..0.99]
}

/// One step applied to a journal and to its in-memory model.
///
/// Index-valued operations carry a selector rather than an index; it is
/// reduced into the range that is valid when the step runs.
#[derive(Debug, Clone)]
pub enum JournalOp {
    /// Append a payload.
    Append(Vec<u8>),
    /// Commit everything appended so far.
    Commit,
    /// Reset the writer to an uncommitted index.
    Reset(u64),
    /// Seal the current segment.
    Checkpoint,
    /// Compact up to an index.
    Compact(u64),
    /// Close and reopen the journal.
    Reopen,
}

/// Strategy for generating journal operations, weighted towards appends.
pub fn journal_op_strategy(max_len: usize) -> impl Strategy<Value = JournalOp> {
    prop_oneof![
        8 => payload_strategy(max_len).prop_map(JournalOp::Append),
        1 => Just(JournalOp::Commit),
        2 => any::<u64>().prop_map(JournalOp::Reset),
        1 => Just(JournalOp::Checkpoint),
        1 => any::<u64>().prop_map(JournalOp::Compact),
        1 => Just(JournalOp::Reopen),
    ]
}

/// Strategy for generating operation sequences.
pub fn journal_ops_strategy(max_len: usize, max_ops: usize) -> impl Strategy<Value = Vec<JournalOp>> {
    prop::collection::vec(journal_op_strategy(max_len), 1..=max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to generate.
    pub cases: u32,
    /// Maximum number of shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
