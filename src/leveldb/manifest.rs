//! `CURRENT` and `MANIFEST-*` parsing: which tables and logs make up the store.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::debug;

use super::coding::Decoder;
use super::log::LogReader;
use crate::error::StoreError;

pub(crate) const BYTEWISE_COMPARATOR: &str = "leveldb.BytewiseComparator";

const TAG_COMPARATOR: u32 = 1;
const TAG_LOG_NUMBER: u32 = 2;
const TAG_NEXT_FILE_NUMBER: u32 = 3;
const TAG_LAST_SEQUENCE: u32 = 4;
const TAG_COMPACT_POINTER: u32 = 5;
const TAG_DELETED_FILE: u32 = 6;
const TAG_NEW_FILE: u32 = 7;
const TAG_PREV_LOG_NUMBER: u32 = 9;

/// The store's current file set, replayed from its manifest.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Version {
    pub(crate) comparator: Option<String>,
    pub(crate) log_number: u64,
    pub(crate) prev_log_number: u64,
    /// Live tables as `(level, file number)`.
    pub(crate) tables: BTreeSet<(u32, u64)>,
}

impl Version {
    /// Whether the write-ahead log `number` may hold entries not yet in a table.
    pub(crate) fn is_live_log(&self, number: u64) -> bool {
        number >= self.log_number || (number != 0 && number == self.prev_log_number)
    }

    fn apply(&mut self, edit: &[u8]) -> Result<(), StoreError> {
        let mut d = Decoder::new(edit);
        while !d.is_empty() {
            match d.varint32()? {
                TAG_COMPARATOR => {
                    let name = String::from_utf8_lossy(d.length_prefixed()?).into_owned();
                    self.comparator = Some(name);
                }
                TAG_LOG_NUMBER => self.log_number = d.varint64()?,
                TAG_NEXT_FILE_NUMBER | TAG_LAST_SEQUENCE => {
                    d.varint64()?;
                }
                TAG_COMPACT_POINTER => {
                    d.varint32()?;
                    d.length_prefixed()?;
                }
                TAG_DELETED_FILE => {
                    let level = d.varint32()?;
                    let number = d.varint64()?;
                    self.tables.remove(&(level, number));
                }
                TAG_NEW_FILE => {
                    let level = d.varint32()?;
                    let number = d.varint64()?;
                    let _size = d.varint64()?;
                    let _smallest = d.length_prefixed()?;
                    let _largest = d.length_prefixed()?;
                    self.tables.insert((level, number));
                }
                TAG_PREV_LOG_NUMBER => self.prev_log_number = d.varint64()?,
                other => {
                    return Err(StoreError::corruption(format!(
                        "unknown version edit tag {other}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Reads `CURRENT`, then replays every edit in the manifest it names.
pub(crate) fn load(dir: &Path) -> Result<Version, StoreError> {
    let current = fs::read_to_string(dir.join("CURRENT"))?;
    let name = current
        .strip_suffix('\n')
        .filter(|name| name.starts_with("MANIFEST-") && !name.contains(['/', '\\']))
        .ok_or_else(|| StoreError::corruption("CURRENT does not name a manifest"))?;

    debug!(manifest = name, "replaying manifest");
    let data = fs::read(dir.join(name))?;
    let mut version = Version::default();
    for record in LogReader::new(data) {
        version.apply(&record?)?;
    }
    Ok(version)
}

/// Parses `NNNNNN.ext` file names; returns the number when the extension matches.
pub(crate) fn file_number(name: &str, ext: &str) -> Option<u64> {
    let stem = name.strip_suffix(ext)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
