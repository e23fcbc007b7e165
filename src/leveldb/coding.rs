//! Varint, fixed-width and checksum helpers shared by the LevelDB file formats.

use crate::error::StoreError;

const MASK_DELTA: u32 = 0xa282_ead8;

/// Reverses LevelDB's CRC masking.
pub(crate) fn unmask_crc(masked: u32) -> u32 {
    let rot = masked.wrapping_sub(MASK_DELTA);
    rot.rotate_left(15)
}

/// CRC32C of `kind` followed by `data`, as covered by a log record checksum.
pub(crate) fn typed_crc(kind: u8, data: &[u8]) -> u32 {
    crc32c::crc32c_append(crc32c::crc32c(&[kind]), data)
}

/// CRC32C of `data` followed by `kind`, as covered by a table block trailer.
pub(crate) fn block_crc(data: &[u8], kind: u8) -> u32 {
    crc32c::crc32c_append(crc32c::crc32c(data), &[kind])
}

/// Cursor over an encoded buffer; every read is bounds-checked.
pub(crate) struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn u8(&mut self) -> Result<u8, StoreError> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| StoreError::corruption("unexpected end of data"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8], StoreError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| StoreError::corruption("slice runs past end of data"))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn fixed32(&mut self) -> Result<u32, StoreError> {
        let raw = self.bytes(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    pub(crate) fn fixed64(&mut self) -> Result<u64, StoreError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.bytes(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    pub(crate) fn varint64(&mut self) -> Result<u64, StoreError> {
        let mut result = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.u8()?;
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(StoreError::corruption("varint64 too long"))
    }

    pub(crate) fn varint32(&mut self) -> Result<u32, StoreError> {
        let value = self.varint64()?;
        u32::try_from(value).map_err(|_| StoreError::corruption("varint32 overflow"))
    }

    /// Reads a varint32 length followed by that many bytes.
    pub(crate) fn length_prefixed(&mut self) -> Result<&'a [u8], StoreError> {
        let len = self.varint32()? as usize;
        self.bytes(len)
    }
}
