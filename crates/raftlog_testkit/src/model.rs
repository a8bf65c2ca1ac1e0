//! Model-based checking of journal operations.
//!
//! A [`JournalModel`] tracks what a journal must contain after a sequence of
//! [`JournalOp`]s. [`check_ops`] applies the same sequence to a real journal
//! and compares the two after every step.

use crate::fixtures::TestJournal;
use crate::generators::JournalOp;
use raftlog_core::{BytesMapper, EntryWriter, JournalError, StorageLevel};

/// The expected contents of a journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalModel {
    /// Index of the first retained entry.
    pub first_index: u64,
    /// Retained entries, starting at `first_index`.
    pub entries: Vec<Vec<u8>>,
    /// Highest committed index.
    pub commit_index: u64,
}

impl Default for JournalModel {
    fn default() -> Self {
        Self {
            first_index: 1,
            entries: Vec::new(),
            commit_index: 0,
        }
    }
}

impl JournalModel {
    /// Index of the last entry, `first_index - 1` when empty.
    pub fn last_index(&self) -> u64 {
        self.first_index + self.entries.len() as u64 - 1
    }

    /// Index the next append receives.
    pub fn next_index(&self) -> u64 {
        self.last_index() + 1
    }

    /// Records an appended entry.
    pub fn append(&mut self, entry: Vec<u8>) {
        self.entries.push(entry);
    }

    /// Commits every entry.
    pub fn commit(&mut self) {
        self.commit_index = self.commit_index.max(self.last_index());
    }

    /// Picks a valid reset target from `selector`, if any exists.
    pub fn reset_target(&self, selector: u64) -> Option<u64> {
        let low = self.commit_index + 1;
        let high = self.next_index();
        (low <= high).then(|| low + selector % (high - low + 1))
    }

    /// Discards entries from `index` on.
    pub fn reset(&mut self, index: u64) {
        if index < self.first_index {
            self.first_index = index;
            self.entries.clear();
        } else {
            self.entries.truncate((index - self.first_index) as usize);
        }
    }

    /// Picks a compaction target from `selector`.
    pub fn compact_target(&self, selector: u64) -> u64 {
        let span = self.next_index() - self.first_index + 1;
        self.first_index + selector % span
    }

    /// Drops entries before `first_index`, as chosen by the journal.
    pub fn compact(&mut self, first_index: u64) {
        if first_index > self.first_index {
            let drop = ((first_index - self.first_index) as usize).min(self.entries.len());
            self.entries.drain(..drop);
            self.first_index = first_index;
        }
    }

    /// Forgets the commit index, which lives only in memory.
    pub fn reopen(&mut self) {
        self.commit_index = 0;
    }
}

/// Applies `ops` to a small journal at `level` and to a model, comparing
/// them after every step.
///
/// Returns a description of the first divergence.
pub fn check_ops(level: StorageLevel, ops: &[JournalOp]) -> Result<(), String> {
    let mut journal = TestJournal::small(level);
    let mut writer = Some(journal.writer().map_err(|e| e.to_string())?);
    let mut model = JournalModel::default();

    for (step, op) in ops.iter().enumerate() {
        let fail = |e: JournalError| format!("step {step} {op:?}: {e}");
        let Some(active) = writer.as_mut() else {
            return Err(format!("step {step}: writer missing"));
        };
        match op {
            JournalOp::Append(entry) => {
                active.append(&BytesMapper, entry.as_slice()).map_err(fail)?;
                model.append(entry.clone());
            }
            JournalOp::Commit => {
                active.commit(model.last_index()).map_err(fail)?;
                model.commit();
            }
            JournalOp::Reset(selector) => {
                if let Some(index) = model.reset_target(*selector) {
                    active.reset(index).map_err(fail)?;
                    model.reset(index);
                }
            }
            JournalOp::Checkpoint => active.checkpoint().map_err(fail)?,
            JournalOp::Compact(selector) => {
                journal.compact(model.compact_target(*selector)).map_err(fail)?;
                model.compact(journal.first_index());
            }
            JournalOp::Reopen => {
                writer = None;
                journal = journal.reopen().map_err(fail)?;
                writer = Some(journal.writer().map_err(fail)?);
                model.reopen();
            }
        }

        let Some(active) = writer.as_ref() else {
            return Err(format!("step {step}: writer missing"));
        };
        compare(&journal, active, &model).map_err(|e| format!("after step {step} {op:?}: {e}"))?;
    }
    Ok(())
}

fn compare(journal: &TestJournal, writer: &EntryWriter, model: &JournalModel) -> Result<(), String> {
    if journal.first_index() != model.first_index {
        return Err(format!(
            "first index {} != {}",
            journal.first_index(),
            model.first_index
        ));
    }
    if journal.last_index() != model.last_index() {
        return Err(format!(
            "last index {} != {}",
            journal.last_index(),
            model.last_index()
        ));
    }
    if writer.next_index() != model.next_index() {
        return Err(format!(
            "next index {} != {}",
            writer.next_index(),
            model.next_index()
        ));
    }
    if journal.commit_index() != model.commit_index {
        return Err(format!(
            "commit index {} != {}",
            journal.commit_index(),
            model.commit_index
        ));
    }

    let entries = journal
        .read_from(model.first_index)
        .map_err(|e| e.to_string())?;
    let expected: Vec<(u64, Vec<u8>)> = (model.first_index..)
        .zip(model.entries.iter().cloned())
        .collect();
    if entries != expected {
        return Err(format!(
            "read {} entries, expected {}",
            entries.len(),
            expected.len()
        ));
    }
    Ok(())
}
