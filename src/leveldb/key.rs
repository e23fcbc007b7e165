//! Internal keys: `user_key | fixed64(sequence << 8 | kind)`.

use std::cmp::Ordering;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ValueKind {
    Deletion = 0,
    Value = 1,
}

impl TryFrom<u8> for ValueKind {
    type Error = StoreError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(ValueKind::Deletion),
            1 => Ok(ValueKind::Value),
            other => Err(StoreError::corruption(format!("unknown value type {other}"))),
        }
    }
}

/// One versioned entry as LevelDB stores it internally.
///
/// Ordered by user key ascending, then newest first, which is the order
/// every table and the merged view use.
#[derive(Debug, Clone)]
pub(crate) struct InternalEntry {
    pub(crate) user_key: Vec<u8>,
    pub(crate) sequence: u64,
    pub(crate) kind: ValueKind,
    pub(crate) value: Vec<u8>,
}

impl InternalEntry {
    /// Splits an encoded internal key and attaches `value`.
    pub(crate) fn decode(internal_key: &[u8], value: Vec<u8>) -> Result<Self, StoreError> {
        let split = internal_key
            .len()
            .checked_sub(8)
            .ok_or_else(|| StoreError::corruption("internal key shorter than 8 bytes"))?;
        let (user_key, trailer) = internal_key.split_at(split);

        let mut raw = [0u8; 8];
        raw.copy_from_slice(trailer);
        let tag = u64::from_le_bytes(raw);

        Ok(Self {
            user_key: user_key.to_vec(),
            sequence: tag >> 8,
            kind: ValueKind::try_from((tag & 0xff) as u8)?,
            value,
        })
    }
}

impl Ord for InternalEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.user_key
            .cmp(&other.user_key)
            .then_with(|| other.sequence.cmp(&self.sequence))
            .then_with(|| other.kind.cmp(&self.kind))
    }
}

impl PartialOrd for InternalEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for InternalEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for InternalEntry {}
