//! Reader for the LevelDB log format shared by write-ahead logs and manifests.
//!
//! ```text
//! block  := record* trailer?          (32 KiB blocks)
//! record := checksum (4) | length (2) | type (1) | data (length)
//! ```
//! Records never straddle a block boundary; larger payloads are split into
//! FIRST / MIDDLE / LAST fragments.

use tracing::debug;

use super::coding::{typed_crc, unmask_crc};
use crate::error::StoreError;

pub(crate) const BLOCK_SIZE: usize = 32 * 1024;
pub(crate) const HEADER_SIZE: usize = 7;

const ZERO_TYPE: u8 = 0;
const FULL_TYPE: u8 = 1;
const FIRST_TYPE: u8 = 2;
const MIDDLE_TYPE: u8 = 3;
const LAST_TYPE: u8 = 4;

/// Iterates the logical records of an in-memory log file.
///
/// Checksum or framing errors are yielded as `Err` and the reader resumes at
/// the next block; a truncated tail (an interrupted write) ends iteration.
pub(crate) struct LogReader {
    data: Vec<u8>,
    pos: usize,
    fragment: Option<Vec<u8>>,
    pending: Option<(u8, Vec<u8>)>,
}

impl LogReader {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            fragment: None,
            pending: None,
        }
    }

    fn skip_to_next_block(&mut self) {
        self.pos = (self.pos / BLOCK_SIZE + 1) * BLOCK_SIZE;
        self.fragment = None;
    }

    fn read_physical(&mut self) -> Option<Result<(u8, Vec<u8>), StoreError>> {
        loop {
            let block_left = BLOCK_SIZE - self.pos % BLOCK_SIZE;
            if block_left < HEADER_SIZE {
                self.pos += block_left;
            }
            if self.pos + HEADER_SIZE > self.data.len() {
                return None;
            }

            let header = &self.data[self.pos..self.pos + HEADER_SIZE];
            let stored_crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let length = u16::from_le_bytes([header[4], header[5]]) as usize;
            let kind = header[6];

            if kind == ZERO_TYPE && length == 0 {
                // preallocated space, nothing more in this block
                self.skip_to_next_block();
                continue;
            }

            let start = self.pos + HEADER_SIZE;
            let end = start + length;
            if end > self.data.len() {
                debug!("dropping truncated log record at offset {}", self.pos);
                return None;
            }
            if end > self.pos - self.pos % BLOCK_SIZE + BLOCK_SIZE {
                self.skip_to_next_block();
                return Some(Err(StoreError::corruption("log record crosses block boundary")));
            }

            let payload = &self.data[start..end];
            if unmask_crc(stored_crc) != typed_crc(kind, payload) {
                self.skip_to_next_block();
                return Some(Err(StoreError::corruption("log record checksum mismatch")));
            }

            let payload = payload.to_vec();
            self.pos = end;
            return Some(Ok((kind, payload)));
        }
    }
}

impl Iterator for LogReader {
    type Item = Result<Vec<u8>, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (kind, payload) = match self.pending.take() {
                Some(record) => record,
                None => match self.read_physical()? {
                    Ok(record) => record,
                    Err(e) => return Some(Err(e)),
                },
            };

            match kind {
                FULL_TYPE | FIRST_TYPE if self.fragment.is_some() => {
                    // the previous record was never finished; report it, then retry this one
                    self.fragment = None;
                    self.pending = Some((kind, payload));
                    return Some(Err(StoreError::corruption("partial log record")));
                }
                FULL_TYPE => return Some(Ok(payload)),
                FIRST_TYPE => self.fragment = Some(payload),
                MIDDLE_TYPE | LAST_TYPE => {
                    let Some(buf) = self.fragment.as_mut() else {
                        return Some(Err(StoreError::corruption("orphaned log fragment")));
                    };
                    buf.extend_from_slice(&payload);
                    if kind == LAST_TYPE {
                        return self.fragment.take().map(Ok);
                    }
                }
                other => {
                    return Some(Err(StoreError::corruption(format!(
                        "unknown log record type {other}"
                    ))));
                }
            }
        }
    }
}
