//! # raftlog Testkit
//!
//! Test utilities for raftlog.
//!
//! This crate provides:
//! - Temporary journal fixtures that can be reopened in place
//! - Property-based test generators using proptest
//! - A model of journal contents for operation-sequence checking
//! - Crash recovery harnesses that damage segment files
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use raftlog_testkit::prelude::*;
//! use raftlog_core::StorageLevel;
//!
//! with_temp_journal(StorageLevel::Disk, |journal| {
//!     assert_eq!(journal.last_index(), 0);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod model;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
