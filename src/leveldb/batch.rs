//! WriteBatch decoding for write-ahead log replay.
//!
//! ```text
//! batch  := sequence (fixed64) | count (fixed32) | op*
//! op     := 0x01 key value     (put)
//!         | 0x00 key           (delete)
//! ```

use super::coding::Decoder;
use super::key::{InternalEntry, ValueKind};
use crate::error::StoreError;

const HEADER_SIZE: usize = 12;

/// Decodes one batch; operation `i` gets sequence number `base + i`.
pub(crate) fn decode(batch: &[u8]) -> Result<Vec<InternalEntry>, StoreError> {
    if batch.len() < HEADER_SIZE {
        return Err(StoreError::corruption("write batch too small"));
    }

    let mut d = Decoder::new(batch);
    let base = d.fixed64()?;
    let count = d.fixed32()?;

    let mut entries = Vec::new();
    while !d.is_empty() {
        let kind = ValueKind::try_from(d.u8()?)?;
        let key = d.length_prefixed()?.to_vec();
        let value = match kind {
            ValueKind::Value => d.length_prefixed()?.to_vec(),
            ValueKind::Deletion => Vec::new(),
        };
        let sequence = base
            .checked_add(entries.len() as u64)
            .ok_or_else(|| StoreError::corruption("write batch sequence number overflows"))?;
        entries.push(InternalEntry {
            user_key: key,
            sequence,
            kind,
            value,
        });
    }

    if entries.len() != count as usize {
        return Err(StoreError::corruption(format!(
            "write batch declares {count} ops but holds {}",
            entries.len()
        )));
    }
    Ok(entries)
}
