//! Compact command implementation.

use super::{format_size, Target};
use crate::error::CliResult;
use raftlog_core::{SegmentInfo, SegmentedJournal};
use tracing::info;

/// Compaction plan or outcome.
#[derive(Debug)]
pub struct CompactStats {
    /// First index retained after compaction.
    pub first_index: u64,
    /// Segments deleted, or that would be deleted.
    pub removed: Vec<SegmentInfo>,
    /// Bytes before compaction.
    pub bytes_before: u64,
    /// Bytes after compaction.
    pub bytes_after: u64,
}

/// Compacts the journal up to `index`, or only plans it when `dry_run`.
pub fn compact(target: &Target, index: u64, dry_run: bool) -> CliResult<CompactStats> {
    target.segment_files()?;
    let journal = SegmentedJournal::open(target.config())?;

    let segments = journal.segments()?;
    let bytes_before = journal.size()?;
    let first_index = match journal.compactable_index(index) {
        0 => journal.first_index(),
        first_index => first_index,
    };
    let removed: Vec<SegmentInfo> = segments
        .into_iter()
        .filter(|segment| segment.first_index < first_index)
        .collect();

    let bytes_after = if dry_run {
        bytes_before - removed.iter().map(|s| s.file_size).sum::<u64>()
    } else {
        journal.compact(index)?;
        info!(
            name = %target.name,
            removed = removed.len(),
            first_index = journal.first_index(),
            "compacted journal"
        );
        journal.size()?
    };
    journal.close()?;

    Ok(CompactStats {
        first_index,
        removed,
        bytes_before,
        bytes_after,
    })
}

/// Runs the compact command.
pub fn run(target: &Target, index: u64, dry_run: bool) -> CliResult<()> {
    println!("Compacting journal '{}' at {:?} up to index {}", target.name, target.path, index);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let stats = compact(target, index, dry_run)?;
    if stats.removed.is_empty() {
        println!("No compaction needed - no segment lies wholly before index {}", index);
        return Ok(());
    }

    println!("Segments {}:", if dry_run { "to delete" } else { "deleted" });
    for segment in &stats.removed {
        println!(
            "  [{}] indexes {}..={} ({})",
            segment.id,
            segment.first_index,
            segment.last_index,
            format_size(segment.file_size)
        );
    }
    println!();
    println!("  First index: {}", stats.first_index);
    println!("  Size before: {}", format_size(stats.bytes_before));
    println!("  Size after:  {}", format_size(stats.bytes_after));

    if !dry_run {
        println!();
        println!("✓ Compaction complete");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::inspect::inspect;
    use crate::commands::test_support::journal_with_entries;
    use tempfile::tempdir;

    #[test]
    fn dry_run_changes_nothing() {
        let dir = tempdir().unwrap();
        let target = journal_with_entries(&dir, 10);

        let stats = compact(&target, 10, true).unwrap();
        assert_eq!(stats.first_index, 9);
        assert_eq!(stats.removed.len(), 2);
        assert!(stats.bytes_after < stats.bytes_before);
        assert_eq!(inspect(&target).unwrap().segments.len(), 3);
    }

    #[test]
    fn compaction_deletes_leading_segments() {
        let dir = tempdir().unwrap();
        let target = journal_with_entries(&dir, 10);

        let stats = compact(&target, 6, false).unwrap();
        assert_eq!(stats.first_index, 5);
        assert_eq!(stats.removed.len(), 1);

        let result = inspect(&target).unwrap();
        assert_eq!(result.first_index, 5);
        assert_eq!(result.segments.len(), 2);
    }

    #[test]
    fn index_in_first_segment_is_a_no_op() {
        let dir = tempdir().unwrap();
        let target = journal_with_entries(&dir, 10);

        let stats = compact(&target, 2, false).unwrap();
        assert!(stats.removed.is_empty());
        assert_eq!(stats.bytes_after, stats.bytes_before);
    }
}
