//! The segmented journal.

use super::reader::{EntryReader, ReaderCursor};
use super::writer::EntryWriter;
use crate::config::JournalConfig;
use crate::dir::JournalDir;
use crate::error::{JournalError, JournalResult};
use crate::segment::{Segment, SegmentDescriptor, SegmentFile, SegmentInfo};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Free space required before a segment is created, in multiples of the
/// maximum segment size.
const SEGMENT_BUFFER_FACTOR: u64 = 3;

/// Segments ordered by first index, plus the one being written.
#[derive(Debug)]
struct SegmentMap {
    segments: BTreeMap<u64, Arc<Segment>>,
    current: Arc<Segment>,
}

impl SegmentMap {
    fn first(&self) -> &Arc<Segment> {
        self.segments.values().next().unwrap_or(&self.current)
    }

    fn last(&self) -> &Arc<Segment> {
        self.segments.values().next_back().unwrap_or(&self.current)
    }

    fn floor(&self, index: u64) -> Option<&Arc<Segment>> {
        self.segments.range(..=index).next_back().map(|(_, s)| s)
    }
}

/// State shared by the journal handle, its writer and its readers.
#[derive(Debug)]
pub(crate) struct JournalInner {
    config: JournalConfig,
    dir: Mutex<Option<JournalDir>>,
    segments: RwLock<SegmentMap>,
    readers: Mutex<HashMap<u64, Arc<Mutex<ReaderCursor>>>>,
    next_reader_id: AtomicU64,
    commit_index: AtomicU64,
    writer_held: AtomicBool,
    closed: AtomicBool,
}

impl JournalInner {
    pub(crate) fn config(&self) -> &JournalConfig {
        &self.config
    }

    pub(crate) fn ensure_open(&self) -> JournalResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(JournalError::Closed);
        }
        Ok(())
    }

    pub(crate) fn first_index(&self) -> u64 {
        self.segments.read().first().first_index()
    }

    pub(crate) fn last_index(&self) -> u64 {
        self.segments.read().last().last_index()
    }

    pub(crate) fn current(&self) -> Arc<Segment> {
        Arc::clone(&self.segments.read().current)
    }

    /// Returns the segment that holds or would hold `index`.
    ///
    /// Indexes before the first segment resolve to the first segment.
    pub(crate) fn segment(&self, index: u64) -> JournalResult<Arc<Segment>> {
        self.ensure_open()?;
        let map = self.segments.read();
        if map.current.first_index() <= index {
            return Ok(Arc::clone(&map.current));
        }
        Ok(Arc::clone(map.floor(index).unwrap_or_else(|| map.first())))
    }

    /// Returns the segment after the one starting at `first_index`.
    pub(crate) fn next_segment(&self, first_index: u64) -> Option<Arc<Segment>> {
        let map = self.segments.read();
        map.segments
            .range(first_index + 1..)
            .next()
            .map(|(_, s)| Arc::clone(s))
    }

    pub(crate) fn commit_index(&self) -> u64 {
        self.commit_index.load(Ordering::Acquire)
    }

    /// Raises the commit index. Lower values are ignored.
    pub(crate) fn set_commit_index(&self, index: u64) {
        self.commit_index.fetch_max(index, Ordering::AcqRel);
    }

    pub(crate) fn release_writer(&self) {
        self.writer_held.store(false, Ordering::Release);
    }

    fn ensure_disk_space(&self) -> JournalResult<()> {
        let required = self.config.max_segment_size as u64 * SEGMENT_BUFFER_FACTOR;
        let available = fs2::available_space(&self.config.directory)?;
        if available < required {
            return Err(JournalError::StorageExhausted {
                required,
                available,
            });
        }
        Ok(())
    }

    fn create_segment(&self, id: u64, first_index: u64) -> JournalResult<Arc<Segment>> {
        let updated = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let descriptor = SegmentDescriptor::builder()
            .id(id)
            .first_index(first_index)
            .max_segment_size(self.config.max_segment_size)
            .max_entries(self.config.max_entries_per_segment)
            .updated(updated)
            .build()?;

        let dir = self.dir.lock();
        let dir = dir.as_ref().ok_or(JournalError::Closed)?;
        let file = SegmentFile::create_new(&dir.segment_path(id), descriptor)?;
        dir.sync()?;

        let segment = Segment::open(
            file,
            self.config.storage_level,
            self.config.max_entry_size,
            self.config.index_density,
        )?;
        debug!(name = %self.config.name, id, first_index, "created segment");
        Ok(segment)
    }

    fn sync_dir(&self) -> JournalResult<()> {
        match self.dir.lock().as_ref() {
            Some(dir) => dir.sync(),
            None => Ok(()),
        }
    }

    /// Seals the current segment and starts the next one after it.
    ///
    /// An empty current segment is returned unchanged.
    pub(crate) fn create_next_segment(&self) -> JournalResult<Arc<Segment>> {
        self.ensure_open()?;
        let mut map = self.segments.write();
        if map.current.is_empty() {
            return Ok(Arc::clone(&map.current));
        }
        self.ensure_disk_space()?;

        let first_index = map.current.last_index() + 1;
        let id = map.last().id() + 1;
        let segment = self.create_segment(id, first_index)?;
        map.segments.insert(first_index, Arc::clone(&segment));
        map.current = Arc::clone(&segment);
        Ok(segment)
    }

    /// Deletes every segment whose first index is after `index` and returns
    /// the new current segment.
    pub(crate) fn remove_segments_after(&self, index: u64) -> JournalResult<Arc<Segment>> {
        self.ensure_open()?;
        let (removed, current) = {
            let mut map = self.segments.write();
            if index < map.first().first_index() {
                return Err(JournalError::index_out_of_range(
                    index,
                    "would remove every segment",
                ));
            }
            let removed = map.segments.split_off(&(index + 1));
            let current = Arc::clone(map.last());
            map.current = Arc::clone(&current);
            (removed, current)
        };

        if !removed.is_empty() {
            debug!(name = %self.config.name, count = removed.len(), index, "removing trailing segments");
            for segment in removed.values() {
                segment.delete()?;
            }
            self.sync_dir()?;
        }
        Ok(current)
    }

    /// Deletes every segment and starts over with one beginning at `index`.
    pub(crate) fn reset_segments(&self, index: u64) -> JournalResult<Arc<Segment>> {
        self.ensure_open()?;
        let (removed, segment) = {
            let mut map = self.segments.write();
            let id = map.last().id() + 1;
            let segment = self.create_segment(id, index)?;
            let mut fresh = BTreeMap::new();
            fresh.insert(index, Arc::clone(&segment));
            let removed = std::mem::replace(&mut map.segments, fresh);
            map.current = Arc::clone(&segment);
            (removed, segment)
        };

        debug!(name = %self.config.name, index, count = removed.len(), "reset journal segments");
        for old in removed.values() {
            old.delete()?;
        }
        self.sync_dir()?;
        Ok(segment)
    }

    /// Returns the first index of the segment holding `index`, or 0.
    pub(crate) fn compactable_index(&self, index: u64) -> u64 {
        self.segments
            .read()
            .floor(index)
            .map_or(0, |segment| segment.first_index())
    }

    pub(crate) fn is_compactable(&self, index: u64) -> bool {
        let map = self.segments.read();
        match map.floor(index) {
            Some(segment) => map.segments.range(..segment.first_index()).next().is_some(),
            None => false,
        }
    }

    /// Deletes every segment lying wholly before the one holding `index`.
    pub(crate) fn compact(&self, index: u64) -> JournalResult<()> {
        self.ensure_open()?;
        let (first_index, removed) = {
            let mut map = self.segments.write();
            let Some(first_index) = map.floor(index).map(|segment| segment.first_index()) else {
                return Ok(());
            };
            let keep = map.segments.split_off(&first_index);
            (first_index, std::mem::replace(&mut map.segments, keep))
        };
        if removed.is_empty() {
            return Ok(());
        }

        debug!(name = %self.config.name, count = removed.len(), first_index, "compacting segments");
        for segment in removed.values() {
            segment.delete()?;
        }
        self.sync_dir()?;
        self.reset_head(first_index)
    }

    pub(crate) fn register_reader(&self, cursor: Arc<Mutex<ReaderCursor>>) -> u64 {
        let id = self.next_reader_id.fetch_add(1, Ordering::Relaxed);
        self.readers.lock().insert(id, cursor);
        id
    }

    pub(crate) fn deregister_reader(&self, id: u64) {
        self.readers.lock().remove(&id);
    }

    /// Moves readers positioned before `index` up to `index`.
    pub(crate) fn reset_head(&self, index: u64) -> JournalResult<()> {
        let readers = self.readers.lock();
        for cursor in readers.values() {
            let mut cursor = cursor.lock();
            if cursor.next_index() < index {
                cursor.reset(self, index)?;
            }
        }
        Ok(())
    }

    /// Moves readers positioned at or after `index` back to `index`.
    pub(crate) fn reset_tail(&self, index: u64) -> JournalResult<()> {
        let readers = self.readers.lock();
        for cursor in readers.values() {
            let mut cursor = cursor.lock();
            if cursor.next_index() >= index {
                cursor.reset(self, index)?;
            }
        }
        Ok(())
    }

    fn size(&self) -> JournalResult<u64> {
        let map = self.segments.read();
        let mut size = 0;
        for segment in map.segments.values() {
            size += segment.file().size()?;
        }
        Ok(size)
    }

    fn segment_infos(&self) -> JournalResult<Vec<SegmentInfo>> {
        let map = self.segments.read();
        map.segments.values().map(|segment| segment.info()).collect()
    }

    fn close(&self) -> JournalResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.readers.lock().clear();
        let result = self.current().flush();
        self.dir.lock().take();
        debug!(name = %self.config.name, "closed journal");
        result
    }
}

/// A crash-safe, append-only journal stored as a chain of segment files.
///
/// # Opening a Journal
///
/// ```rust
/// use raftlog_core::{BytesMapper, JournalConfig, SegmentedJournal};
///
/// let dir = tempfile::tempdir().unwrap();
/// let journal = SegmentedJournal::open(JournalConfig::new().directory(dir.path())).unwrap();
///
/// let mut writer = journal.writer().unwrap();
/// writer.append(&BytesMapper, &b"entry"[..]).unwrap();
///
/// let mut reader = journal.open_reader(1).unwrap();
/// let entry: Vec<u8> = reader.next(&BytesMapper).unwrap().unwrap();
/// assert_eq!(entry, b"entry");
/// ```
///
/// # Concurrency
///
/// The journal is `Send + Sync`. There is one [`EntryWriter`] at a time and
/// any number of [`EntryReader`]s, each usable from its own thread.
/// Compaction and writer resets reposition every open reader they affect.
#[derive(Debug)]
pub struct SegmentedJournal {
    inner: Arc<JournalInner>,
}

impl SegmentedJournal {
    /// Opens the journal described by `config`, creating it if needed.
    ///
    /// Segments are loaded and checked for a contiguous chain of indexes.
    /// The first segment that does not continue its predecessor, and every
    /// segment after it, is deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the journal is
    /// locked by another process, or a segment cannot be read.
    pub fn open(config: JournalConfig) -> JournalResult<Self> {
        config.validate()?;
        let dir = JournalDir::open(&config.directory, &config.name)?;

        let mut segments = load_segments(&config, &dir)?;
        let current = match segments.values().next_back() {
            Some(last) => Arc::clone(last),
            None => {
                let inner_dir = Mutex::new(Some(dir));
                let segment = create_initial_segment(&config, &inner_dir)?;
                segments.insert(segment.first_index(), Arc::clone(&segment));
                return Ok(Self::from_parts(config, inner_dir, segments, segment));
            }
        };

        let residue = current.acquire_writer()?.discard_residue()?;
        if let Some(residue) = residue {
            warn!(
                name = %config.name,
                id = current.id(),
                last_index = current.last_index(),
                length = residue.length,
                max_entry_size = current.max_entry_size(),
                "discarded unreadable bytes after last entry"
            );
            current.flush()?;
        }

        Ok(Self::from_parts(
            config,
            Mutex::new(Some(dir)),
            segments,
            current,
        ))
    }

    fn from_parts(
        config: JournalConfig,
        dir: Mutex<Option<JournalDir>>,
        segments: BTreeMap<u64, Arc<Segment>>,
        current: Arc<Segment>,
    ) -> Self {
        let map = SegmentMap { segments, current };
        debug!(
            name = %config.name,
            segments = map.segments.len(),
            first_index = map.first().first_index(),
            last_index = map.last().last_index(),
            "opened journal"
        );
        Self {
            inner: Arc::new(JournalInner {
                config,
                dir,
                segments: RwLock::new(map),
                readers: Mutex::new(HashMap::new()),
                next_reader_id: AtomicU64::new(0),
                commit_index: AtomicU64::new(0),
                writer_held: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the journal configuration.
    #[must_use]
    pub fn config(&self) -> &JournalConfig {
        self.inner.config()
    }

    /// Returns the index of the first retained entry.
    #[must_use]
    pub fn first_index(&self) -> u64 {
        self.inner.first_index()
    }

    /// Returns the index of the last written entry, `first_index() - 1` if
    /// the journal is empty.
    #[must_use]
    pub fn last_index(&self) -> u64 {
        self.inner.last_index()
    }

    /// Returns the highest index declared committed.
    #[must_use]
    pub fn commit_index(&self) -> u64 {
        self.inner.commit_index()
    }

    /// Takes the journal's writer.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::InvalidOperation`] while another
    /// [`EntryWriter`] is alive, or [`JournalError::Closed`].
    pub fn writer(&self) -> JournalResult<EntryWriter> {
        self.inner.ensure_open()?;
        if self
            .inner
            .writer_held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(JournalError::invalid_operation("journal writer already taken"));
        }
        match self.inner.current().acquire_writer() {
            Ok(writer) => Ok(EntryWriter::new(Arc::clone(&self.inner), writer)),
            Err(e) => {
                self.inner.release_writer();
                Err(e)
            }
        }
    }

    /// Opens a reader whose first entry is `index`.
    ///
    /// An `index` before the first retained entry starts at the first one.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] or a storage error.
    pub fn open_reader(&self, index: u64) -> JournalResult<EntryReader> {
        EntryReader::open(&self.inner, index, false)
    }

    /// Opens a reader that never reads past the commit index.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] or a storage error.
    pub fn open_commits_reader(&self, index: u64) -> JournalResult<EntryReader> {
        EntryReader::open(&self.inner, index, true)
    }

    /// Returns whether [`Self::compact`] at `index` would delete anything.
    #[must_use]
    pub fn is_compactable(&self, index: u64) -> bool {
        self.inner.is_compactable(index)
    }

    /// Returns the first index of the segment holding `index`, or 0 if
    /// `index` precedes every segment.
    #[must_use]
    pub fn compactable_index(&self, index: u64) -> u64 {
        self.inner.compactable_index(index)
    }

    /// Deletes every segment lying wholly before the segment holding
    /// `index`. Readers left behind move to the new first index.
    ///
    /// Compaction is not bounded by the commit index.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] or an I/O error.
    pub fn compact(&self, index: u64) -> JournalResult<()> {
        self.inner.compact(index)
    }

    /// Returns the combined size of all segment files.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a file size cannot be read.
    pub fn size(&self) -> JournalResult<u64> {
        self.inner.size()
    }

    /// Returns a snapshot of every segment, ordered by first index.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a file size cannot be read.
    pub fn segments(&self) -> JournalResult<Vec<SegmentInfo>> {
        self.inner.segment_infos()
    }

    /// Flushes the current segment and releases the directory lock.
    ///
    /// Outstanding writers and readers fail with [`JournalError::Closed`]
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns the error from the final flush.
    pub fn close(self) -> JournalResult<()> {
        self.inner.close()
    }
}

impl Drop for SegmentedJournal {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            warn!(name = %self.inner.config.name, error = %e, "failed to close journal");
        }
    }
}

fn create_initial_segment(
    config: &JournalConfig,
    dir: &Mutex<Option<JournalDir>>,
) -> JournalResult<Arc<Segment>> {
    let descriptor = SegmentDescriptor::builder()
        .id(1)
        .first_index(1)
        .max_segment_size(config.max_segment_size)
        .max_entries(config.max_entries_per_segment)
        .updated(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        )
        .build()?;

    let dir = dir.lock();
    let dir = dir.as_ref().ok_or(JournalError::Closed)?;
    let file = SegmentFile::create_new(&dir.segment_path(1), descriptor)?;
    dir.sync()?;
    debug!(name = %config.name, "created initial segment");
    Segment::open(
        file,
        config.storage_level,
        config.max_entry_size,
        config.index_density,
    )
}

/// Opens every segment file and keeps the longest contiguous prefix.
fn load_segments(
    config: &JournalConfig,
    dir: &JournalDir,
) -> JournalResult<BTreeMap<u64, Arc<Segment>>> {
    let mut loaded = Vec::new();
    for (id, path) in dir.segment_files()? {
        let file = SegmentFile::open_existing(&path)?;
        if file.segment_id() != id {
            warn!(path = %path.display(), descriptor_id = file.segment_id(), "segment file name does not match its descriptor");
        }
        let segment = Segment::open(
            file,
            config.storage_level,
            config.max_entry_size,
            config.index_density,
        )?;
        debug!(id = segment.id(), path = %path.display(), "loaded segment");
        loaded.push(segment);
    }
    loaded.sort_by_key(|segment| (segment.first_index(), segment.id()));

    let mut segments = BTreeMap::new();
    let mut previous: Option<Arc<Segment>> = None;
    let mut corrupted = false;
    for segment in loaded {
        if let Some(prev) = &previous {
            let aligned = prev.last_index() + 1 == segment.first_index()
                && prev.first_index() < segment.first_index()
                && prev.id() < segment.id();
            if !corrupted && !aligned {
                warn!(
                    name = %config.name,
                    path = %segment.file().path().display(),
                    previous = %prev.file().path().display(),
                    "journal is inconsistent: segment is not aligned with its predecessor"
                );
                corrupted = true;
            }
        }
        if corrupted {
            warn!(id = segment.id(), path = %segment.file().path().display(), "deleting inconsistent segment");
            segment.delete()?;
            continue;
        }
        segments.insert(segment.first_index(), Arc::clone(&segment));
        previous = Some(segment);
    }
    if corrupted {
        dir.sync()?;
    }
    Ok(segments)
}
