//! Stress tests for raftlog.
//!
//! These tests verify behavior under heavy load and concurrent access.

use crate::fixtures::payload;
use raftlog_core::{BytesMapper, SegmentedJournal};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of entries to append.
    pub operations: usize,
    /// Number of concurrent reader threads.
    pub threads: usize,
    /// Payload length of every entry.
    pub entry_size: usize,
    /// Commit after every this many appends.
    pub commit_every: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            entry_size: 256,
            commit_every: 16,
        }
    }
}

/// Appends `config.operations` entries and commits periodically.
///
/// Each append counts as one operation.
pub fn stress_sequential_appends(journal: &SegmentedJournal, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let Ok(mut writer) = journal.writer() else {
        return StressTestResult::new(0, config.operations, start.elapsed());
    };

    let mut successful = 0usize;
    let mut failed = 0usize;
    for i in 0..config.operations {
        let index = writer.next_index();
        match writer.append(&BytesMapper, &payload(index, config.entry_size)) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
        if (i + 1) % config.commit_every.max(1) == 0 && writer.commit(index).is_err() {
            failed += 1;
        }
    }
    if writer.flush().is_err() {
        failed += 1;
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Reads every entry from the first index, checking each payload.
///
/// Each entry read counts as one operation.
pub fn stress_sequential_reads(journal: &SegmentedJournal, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    match journal.open_reader(journal.first_index()) {
        Ok(mut reader) => loop {
            match reader.next_indexed(&BytesMapper) {
                Ok(Some(indexed)) if indexed.entry == payload(indexed.index, config.entry_size) => {
                    successful += 1
                }
                Ok(Some(_)) => failed += 1,
                Ok(None) => break,
                Err(_) => {
                    failed += 1;
                    break;
                }
            }
        },
        Err(_) => failed += 1,
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Appends on one thread while `config.threads` commit readers follow.
///
/// Readers must see every committed entry exactly once and in order. Each
/// append and each entry read counts as one operation.
pub fn stress_readers_follow_writer(journal: &SegmentedJournal, config: &StressConfig) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let done = AtomicBool::new(false);
    let first_index = journal.first_index();
    let target = first_index + config.operations as u64 - 1;

    let start = Instant::now();
    thread::scope(|scope| {
        for _ in 0..config.threads {
            scope.spawn(|| {
                let Ok(mut reader) = journal.open_commits_reader(first_index) else {
                    failed.fetch_add(1, Ordering::Relaxed);
                    return;
                };
                let mut expected = first_index;
                while expected <= target {
                    match reader.next_indexed(&BytesMapper) {
                        Ok(Some(indexed)) => {
                            if indexed.index == expected
                                && indexed.entry == payload(indexed.index, config.entry_size)
                            {
                                successful.fetch_add(1, Ordering::Relaxed);
                            } else {
                                failed.fetch_add(1, Ordering::Relaxed);
                            }
                            expected = indexed.index + 1;
                        }
                        Ok(None) if done.load(Ordering::Acquire) && journal.commit_index() < expected => {
                            break;
                        }
                        Ok(None) => thread::yield_now(),
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            break;
                        }
                    }
                }
            });
        }

        let mut writer_config = config.clone();
        writer_config.commit_every = config.commit_every.max(1);
        let appended = stress_sequential_appends(journal, &writer_config);
        if let Ok(mut writer) = journal.writer() {
            let _ = writer.commit(journal.last_index());
        }
        successful.fetch_add(appended.successful_ops, Ordering::Relaxed);
        failed.fetch_add(appended.failed_ops, Ordering::Relaxed);
        done.store(true, Ordering::Release);
    });

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Appends entries and resets back over the uncommitted half, repeatedly.
///
/// Each append and each reset counts as one operation.
pub fn stress_append_reset_cycles(journal: &SegmentedJournal, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let Ok(mut writer) = journal.writer() else {
        return StressTestResult::new(0, 1, start.elapsed());
    };

    let batch = config.commit_every.max(2);
    let mut successful = 0usize;
    let mut failed = 0usize;
    for _ in 0..config.operations / batch {
        let base = writer.next_index();
        for index in base..base + batch as u64 {
            match writer.append(&BytesMapper, &payload(index, config.entry_size)) {
                Ok(_) => successful += 1,
                Err(_) => failed += 1,
            }
        }
        let keep = base + batch as u64 / 2;
        if writer.commit(keep - 1).is_err() {
            failed += 1;
        }
        match writer.reset(keep) {
            Ok(()) if writer.next_index() == keep => successful += 1,
            _ => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}
