//! Inspect command implementation.

use super::{format_size, Target};
use crate::error::CliResult;
use raftlog_core::SegmentInfo;
use serde::Serialize;

/// Journal inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Journal directory.
    pub path: String,
    /// Journal name.
    pub name: String,
    /// First index held by any segment.
    pub first_index: u64,
    /// Last index held by any segment.
    pub last_index: u64,
    /// Total number of entries.
    pub entries: u64,
    /// Combined size of all segment files.
    pub total_size: u64,
    /// Per-segment details, ordered by first index.
    pub segments: Vec<SegmentReport>,
}

/// Details of one segment.
#[derive(Debug, Serialize)]
pub struct SegmentReport {
    /// Runtime state of the segment.
    #[serde(flatten)]
    pub info: SegmentInfo,
    /// Descriptor format version.
    pub version: i32,
    /// Recorded per-segment entry limit.
    pub max_entries: u32,
    /// Descriptor timestamp in milliseconds since the epoch.
    pub updated: u64,
    /// Descriptor lock flag.
    pub locked: bool,
}

/// Collects the inspection result for `target`.
pub fn inspect(target: &Target) -> CliResult<InspectResult> {
    let segments = target.open_segments()?;

    let mut reports = Vec::with_capacity(segments.len());
    for segment in &segments {
        let descriptor = segment.descriptor();
        reports.push(SegmentReport {
            info: segment.info()?,
            version: descriptor.version(),
            max_entries: descriptor.max_entries(),
            updated: descriptor.updated(),
            locked: descriptor.locked(),
        });
    }

    let first_index = reports.first().map_or(0, |r| r.info.first_index);
    let last_index = reports.last().map_or(0, |r| r.info.last_index);
    Ok(InspectResult {
        path: target.path.display().to_string(),
        name: target.name.clone(),
        first_index,
        last_index,
        entries: reports.iter().map(|r| r.info.entries()).sum(),
        total_size: reports.iter().map(|r| r.info.file_size).sum(),
        segments: reports,
    })
}

/// Runs the inspect command.
pub fn run(target: &Target, format: &str) -> CliResult<()> {
    let result = inspect(target)?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("raftlog Journal Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    println!("Name: {}", result.name);
    println!();
    println!("Entries:");
    println!("  First index: {}", result.first_index);
    println!("  Last index:  {}", result.last_index);
    println!("  Count:       {}", result.entries);
    println!();
    println!("Storage:");
    println!("  Segments:   {}", result.segments.len());
    println!("  Total size: {}", format_size(result.total_size));

    println!();
    println!("Segments:");
    for report in &result.segments {
        let info = &report.info;
        println!(
            "  [{}] v{} indexes {}..={} ({} entries), {} of {} bytes used, file {}{}",
            info.id,
            report.version,
            info.first_index,
            info.last_index,
            info.entries(),
            info.bytes_used,
            info.max_segment_size,
            format_size(info.file_size),
            if report.locked { ", locked" } else { "" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::journal_with_entries;
    use crate::error::CliError;
    use tempfile::tempdir;

    #[test]
    fn reports_segments_in_order() {
        let dir = tempdir().unwrap();
        let target = journal_with_entries(&dir, 10);

        let result = inspect(&target).unwrap();
        assert_eq!(result.first_index, 1);
        assert_eq!(result.last_index, 10);
        assert_eq!(result.entries, 10);
        assert_eq!(result.segments.len(), 3);
        assert_eq!(result.segments[1].info.first_index, 5);
        assert_eq!(result.segments[1].version, 1);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["segments"][2]["first_index"], 9);
    }

    #[test]
    fn missing_journal_is_reported() {
        let dir = tempdir().unwrap();
        let target = Target {
            path: dir.path().to_path_buf(),
            name: "absent".to_string(),
            max_entry_size: 64,
        };
        assert!(matches!(inspect(&target), Err(CliError::NoJournal { .. })));
    }
}
