//! Finds the wallet's locked blob among a store's entries.
//!
//! Chrome keys Local Storage entries as `_<origin>\x00\x01<key>`, so the
//! wallet's entry is found by substring rather than by exact key.

use crate::error::MalformedRecord;
use crate::leveldb::RawEntry;
use crate::record::CiphertextRecord;

/// Origin the wallet stores its data under.
pub const ORIGIN: &[u8] = b"sollet.io";
/// Separates the origin from the rest of the key.
pub const ORIGIN_SEPARATOR: u8 = 0x00;
/// Storage-area control byte that precedes the script-visible key.
pub const STORAGE_CONTROL_BYTE: u8 = 0x01;
/// The wallet's own key for its encrypted seed.
pub const KEY_SUFFIX: &[u8] = b"locked";

/// `ORIGIN | ORIGIN_SEPARATOR | STORAGE_CONTROL_BYTE | KEY_SUFFIX`.
pub const LOCKED_KEY_PATTERN: &[u8] = b"sollet.io\x00\x01locked";

/// Result of scanning a store for the locked blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(CiphertextRecord),
    NotFound,
    /// A key matched but its value did not decode.
    Malformed(MalformedRecord),
}

/// Returns the record stored under the first key containing `pattern`.
///
/// Stops consuming `entries` at the first matching key.
pub fn find<I>(entries: I, pattern: &[u8]) -> Lookup
where
    I: IntoIterator<Item = RawEntry>,
{
    match try_find(entries.into_iter().map(Ok::<_, std::convert::Infallible>), pattern) {
        Ok(lookup) => lookup,
        Err(never) => match never {},
    }
}

/// [`find`] over a fallible iterator; the first error ends the scan.
pub fn try_find<I, E>(entries: I, pattern: &[u8]) -> Result<Lookup, E>
where
    I: IntoIterator<Item = Result<RawEntry, E>>,
{
    for entry in entries {
        let entry = entry?;
        if contains(&entry.key, pattern) {
            return Ok(match decode_value(&entry.value) {
                Ok(record) => Lookup::Found(record),
                Err(e) => Lookup::Malformed(e),
            });
        }
    }
    Ok(Lookup::NotFound)
}

/// Decodes a stored value: one format-tag byte, then the JSON record.
///
/// The tag is dropped whatever its value.
pub fn decode_value(value: &[u8]) -> Result<CiphertextRecord, MalformedRecord> {
    let payload = value
        .get(1..)
        .ok_or_else(|| MalformedRecord("empty value".into()))?;
    CiphertextRecord::from_json(payload)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}
