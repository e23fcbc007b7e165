//! Table blocks: prefix-compressed entries followed by a restart array.
//!
//! ```text
//! entry    := shared (varint32) | non_shared (varint32) | value_len (varint32)
//!             | key_delta (non_shared) | value (value_len)
//! trailer  := restart (fixed32) * num_restarts | num_restarts (fixed32)
//! ```
//! Entries are read front to back, so the restart offsets are only used to
//! find where the entries end.

use super::coding::Decoder;
use crate::error::StoreError;

/// Locates a block inside a table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockHandle {
    pub(crate) offset: u64,
    pub(crate) size: u64,
}

impl BlockHandle {
    pub(crate) fn decode_from(d: &mut Decoder<'_>) -> Result<Self, StoreError> {
        Ok(Self {
            offset: d.varint64()?,
            size: d.varint64()?,
        })
    }

    pub(crate) fn decode(data: &[u8]) -> Result<Self, StoreError> {
        Self::decode_from(&mut Decoder::new(data))
    }
}

/// Sequential iterator over the `(key, value)` pairs of one decoded block.
pub(crate) struct BlockIter {
    data: Vec<u8>,
    pos: usize,
    limit: usize,
    key: Vec<u8>,
    failed: bool,
}

impl BlockIter {
    pub(crate) fn new(data: Vec<u8>) -> Result<Self, StoreError> {
        if data.len() < 4 {
            return Err(StoreError::corruption("block too small"));
        }
        let mut tail = Decoder::new(&data[data.len() - 4..]);
        let num_restarts = tail.fixed32()? as usize;
        let limit = num_restarts
            .checked_mul(4)
            .and_then(|restarts| data.len().checked_sub(4 + restarts))
            .ok_or_else(|| StoreError::corruption("bad restart count in block"))?;

        Ok(Self {
            data,
            pos: 0,
            limit,
            key: Vec::new(),
            failed: false,
        })
    }

    fn read_entry(&mut self) -> Result<(Vec<u8>, Vec<u8>), StoreError> {
        let mut d = Decoder::new(&self.data[self.pos..self.limit]);
        let shared = d.varint32()? as usize;
        let non_shared = d.varint32()? as usize;
        let value_len = d.varint32()? as usize;

        if shared > self.key.len() {
            return Err(StoreError::corruption("block entry shares more than previous key"));
        }
        let delta = d.bytes(non_shared)?;
        let value = d.bytes(value_len)?.to_vec();

        self.key.truncate(shared);
        self.key.extend_from_slice(delta);
        self.pos += d.position();
        Ok((self.key.clone(), value))
    }
}

impl Iterator for BlockIter {
    type Item = Result<(Vec<u8>, Vec<u8>), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.limit {
            return None;
        }
        let entry = self.read_entry();
        self.failed = entry.is_err();
        Some(entry)
    }
}
