//! Verify command implementation.
//!
//! Verification opens segment files directly and never repairs anything.
//! A journal that fails here may still open cleanly: opening trims torn
//! tails and deletes segments that break the index chain.

use super::{open_segment, Target};
use crate::error::{CliError, CliResult};
use raftlog_core::segment::HEADER_BYTES;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of segment files checked.
    pub segments_checked: usize,
    /// Number of readable entries.
    pub entries: u64,
    /// Problems that opening the journal would repair by deleting data.
    pub problems: Vec<String>,
    /// Conditions that are expected after a crash.
    pub warnings: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Checks every segment file of `target`.
pub fn verify(target: &Target) -> CliResult<VerifyResult> {
    let mut result = VerifyResult::default();
    let mut segments = Vec::new();

    for (file_id, path) in target.segment_files()? {
        result.segments_checked += 1;
        let segment = match open_segment(&path, target.max_entry_size) {
            Ok(segment) => segment,
            Err(e) => {
                result
                    .problems
                    .push(format!("{}: unreadable segment: {}", path.display(), e));
                continue;
            }
        };

        if segment.id() != file_id {
            result.problems.push(format!(
                "{}: descriptor id {} does not match file name id {}",
                path.display(),
                segment.id(),
                file_id
            ));
        }

        let file_size = segment.file().size()?;
        let tail = segment.bytes_used() as u64;
        if has_residue(&path, tail, file_size)? {
            result.warnings.push(format!(
                "{}: unreadable bytes at offset {} after entry {} (torn write)",
                path.display(),
                tail,
                segment.last_index()
            ));
        }

        debug!(
            path = %path.display(),
            first_index = segment.first_index(),
            last_index = segment.last_index(),
            "checked segment"
        );
        result.entries += segment.last_index() + 1 - segment.first_index();
        segments.push(segment);
    }

    segments.sort_by_key(|segment| (segment.first_index(), segment.id()));
    for pair in segments.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.last_index() + 1 != next.first_index() {
            result.problems.push(format!(
                "segment {} starts at index {} but segment {} ends at {}",
                next.id(),
                next.first_index(),
                prev.id(),
                prev.last_index()
            ));
        }
        if prev.id() >= next.id() {
            result.problems.push(format!(
                "segment {} follows segment {} in index order but has a lower id",
                next.id(),
                prev.id()
            ));
        }
    }

    Ok(result)
}

/// Returns whether a nonzero header sits at `tail`.
fn has_residue(path: &Path, tail: u64, file_size: u64) -> CliResult<bool> {
    if tail + HEADER_BYTES as u64 > file_size {
        return Ok(false);
    }
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(tail))?;
    let mut header = [0u8; HEADER_BYTES];
    file.read_exact(&mut header)?;
    Ok(header.iter().any(|&b| b != 0))
}

/// Runs the verify command.
pub fn run(target: &Target) -> CliResult<()> {
    println!("Verifying journal '{}' at {:?}", target.name, target.path);
    println!();

    let result = verify(target)?;
    println!(
        "  Segments checked: {}, entries: {}",
        result.segments_checked, result.entries
    );
    for warning in &result.warnings {
        println!("    WARNING: {}", warning);
    }
    for problem in &result.problems {
        println!("    ERROR: {}", problem);
    }

    println!();
    if result.is_ok() {
        println!("✓ Journal verification passed");
        Ok(())
    } else {
        println!("✗ Journal verification failed");
        Err(CliError::VerificationFailed {
            problems: result.problems.len(),
        })
    }
}
