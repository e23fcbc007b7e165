//! Read-only access to an on-disk LevelDB store.
//!
//! Opening replays the manifest and any live write-ahead logs into memory and
//! validates every live table; nothing in the store directory is created,
//! recovered or rewritten. While a [`Store`] is open it holds a shared lock
//! on the store's `LOCK` file.

mod batch;
mod block;
mod coding;
mod key;
mod lock;
mod log;
mod manifest;
mod table;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StoreError;
use key::{InternalEntry, ValueKind};
use log::LogReader;
use table::Table;

/// A key/value pair as the store holds it. Neither side is guaranteed to be text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// An open, read-only LevelDB store.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    lock: Option<File>,
    memtable: Vec<InternalEntry>,
    tables: Vec<Table>,
}

impl Store {
    /// Opens the store in `path` for reading.
    ///
    /// # Errors
    ///
    /// Every failure is reported as [`StoreError::OpenFailed`]: a missing or
    /// unreadable directory, a directory that is not a LevelDB store, a store
    /// locked by another process, or a corrupt manifest or table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        Self::open_inner(path).map_err(|e| match e {
            e @ StoreError::OpenFailed { .. } => e,
            other => StoreError::open_failed(path, other),
        })
    }

    fn open_inner(path: &Path) -> Result<Self, StoreError> {
        if !fs::metadata(path)?.is_dir() {
            return Err(StoreError::open_failed(path, "not a directory"));
        }
        if !path.join("CURRENT").is_file() {
            return Err(StoreError::open_failed(path, "no CURRENT file; not a leveldb store"));
        }

        let lock = acquire_lock(path)?;
        let mut store = Self {
            path: path.to_path_buf(),
            lock,
            memtable: Vec::new(),
            tables: Vec::new(),
        };

        let version = manifest::load(path)?;
        if let Some(name) = version.comparator.as_deref() {
            if name != manifest::BYTEWISE_COMPARATOR {
                return Err(StoreError::open_failed(
                    path,
                    format!("unsupported comparator '{name}'"),
                ));
            }
        }

        let mut logs = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(number) = name.to_str().and_then(|n| manifest::file_number(n, "log")) else {
                continue;
            };
            if version.is_live_log(number) {
                logs.push((number, entry.path()));
            }
        }
        logs.sort();
        for (_, log_path) in &logs {
            store.replay_log(log_path)?;
        }
        store.memtable.sort();

        for &(_, number) in &version.tables {
            store.tables.push(Table::open(&table_path(path, number))?);
        }

        debug!(
            path = %path.display(),
            logs = logs.len(),
            tables = store.tables.len(),
            memtable = store.memtable.len(),
            "opened leveldb store"
        );
        Ok(store)
    }

    fn replay_log(&mut self, log_path: &Path) -> Result<(), StoreError> {
        for record in LogReader::new(fs::read(log_path)?) {
            let batch = record.and_then(|record| batch::decode(&record));
            match batch {
                Ok(entries) => self.memtable.extend(entries),
                // leveldb itself drops damaged log blocks when paranoid checks are off
                Err(e) => warn!(log = %log_path.display(), "skipping damaged log record: {e}"),
            }
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Iterates all live entries: keys ascending, newest value per key,
    /// deleted keys omitted.
    ///
    /// Each call starts a fresh pass over the store.
    pub fn entries(&self) -> Entries<'_> {
        let mut sources: Vec<Source<'_>> = Vec::with_capacity(self.tables.len() + 1);
        sources.push(Box::new(self.memtable.iter().cloned().map(Ok::<_, StoreError>)));

        let mut failed = None;
        for table in &self.tables {
            match table.iter() {
                Ok(iter) => sources.push(Box::new(iter)),
                Err(e) => {
                    failed = Some(e);
                    break;
                }
            }
        }

        Entries::new(sources, failed)
    }

    /// Releases the store lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the lock could not be released.
    pub fn close(mut self) -> Result<(), StoreError> {
        self.release_lock().map_err(StoreError::from)
    }

    fn release_lock(&mut self) -> io::Result<()> {
        match self.lock.take() {
            Some(file) => lock::unlock(&file),
            None => Ok(()),
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.release_lock() {
            warn!(path = %self.path.display(), "failed to release store lock: {e}");
        }
    }
}

/// Takes a shared lock on `LOCK` if the store has one.
///
/// A writer such as a running browser holds the lock exclusively, in which
/// case the store is refused rather than read mid-write.
fn acquire_lock(dir: &Path) -> Result<Option<File>, StoreError> {
    let file = match File::open(dir.join("LOCK")) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if !lock::try_lock_shared(&file)? {
        return Err(StoreError::open_failed(
            dir,
            "store is locked by another process",
        ));
    }
    Ok(Some(file))
}

fn table_path(dir: &Path, number: u64) -> PathBuf {
    let ldb = dir.join(format!("{number:06}.ldb"));
    if ldb.exists() {
        return ldb;
    }
    dir.join(format!("{number:06}.sst"))
}

type Source<'a> = Box<dyn Iterator<Item = Result<InternalEntry, StoreError>> + 'a>;

struct HeapItem {
    entry: InternalEntry,
    source: usize,
}

// reversed so the max-heap pops the smallest internal key first
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .entry
            .cmp(&self.entry)
            .then_with(|| other.source.cmp(&self.source))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

/// Lazy merged view over the memtable and every live table.
///
/// Yields at most one error, after which iteration ends.
pub struct Entries<'a> {
    sources: Vec<Source<'a>>,
    heap: BinaryHeap<HeapItem>,
    primed: bool,
    last_key: Option<Vec<u8>>,
    error: Option<StoreError>,
    done: bool,
}

impl<'a> Entries<'a> {
    fn new(sources: Vec<Source<'a>>, error: Option<StoreError>) -> Self {
        Self {
            sources,
            heap: BinaryHeap::new(),
            primed: false,
            last_key: None,
            error,
            done: false,
        }
    }

    fn pull(&mut self, source: usize) -> Result<(), StoreError> {
        if let Some(entry) = self.sources[source].next() {
            self.heap.push(HeapItem {
                entry: entry?,
                source,
            });
        }
        Ok(())
    }

    fn next_internal(&mut self) -> Result<Option<InternalEntry>, StoreError> {
        if !self.primed {
            self.primed = true;
            for source in 0..self.sources.len() {
                self.pull(source)?;
            }
        }
        let Some(HeapItem { entry, source }) = self.heap.pop() else {
            return Ok(None);
        };
        self.pull(source)?;
        Ok(Some(entry))
    }
}

impl Iterator for Entries<'_> {
    type Item = Result<RawEntry, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(e) = self.error.take() {
            self.done = true;
            return Some(Err(e));
        }

        loop {
            let entry = match self.next_internal() {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            // older versions of a key follow its newest one
            if self.last_key.as_deref() == Some(entry.user_key.as_slice()) {
                continue;
            }
            self.last_key = Some(entry.user_key.clone());

            if entry.kind == ValueKind::Value {
                return Some(Ok(RawEntry {
                    key: entry.user_key,
                    value: entry.value,
                }));
            }
        }
    }
}
