//! Sorted table (`.ldb` / `.sst`) reader.
//!
//! ```text
//! data block* | meta block* | metaindex block | index block | footer (48)
//! footer := metaindex handle | index handle | padding to 40 | magic (fixed64)
//! ```
//! Every block is followed by a 5-byte trailer: compression type and the
//! masked CRC32C of the block contents followed by the type.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::block::{BlockHandle, BlockIter};
use super::coding::{Decoder, block_crc, unmask_crc};
use super::key::InternalEntry;
use crate::error::StoreError;

pub(crate) const FOOTER_SIZE: usize = 48;
pub(crate) const TABLE_MAGIC: u64 = 0xdb47_7524_8b80_fb57;
const BLOCK_TRAILER_SIZE: usize = 5;

const NO_COMPRESSION: u8 = 0;
const SNAPPY_COMPRESSION: u8 = 1;

/// A table whose footer has been validated and whose index is in memory.
#[derive(Debug)]
pub(crate) struct Table {
    path: PathBuf,
    len: u64,
    index: Vec<u8>,
}

impl Table {
    pub(crate) fn open(path: &Path) -> Result<Self, StoreError> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < FOOTER_SIZE as u64 {
            return Err(StoreError::corruption(format!(
                "table {} is too short",
                path.display()
            )));
        }

        let mut footer = [0u8; FOOTER_SIZE];
        file.seek(SeekFrom::Start(len - FOOTER_SIZE as u64))?;
        file.read_exact(&mut footer)?;

        let mut d = Decoder::new(&footer);
        let _metaindex = BlockHandle::decode_from(&mut d)?;
        let index_handle = BlockHandle::decode_from(&mut d)?;
        let mut magic = Decoder::new(&footer[FOOTER_SIZE - 8..]);
        if magic.fixed64()? != TABLE_MAGIC {
            return Err(StoreError::corruption(format!(
                "{} is not a leveldb table",
                path.display()
            )));
        }

        let index = read_block(&mut file, len, index_handle)?;
        Ok(Self {
            path: path.to_path_buf(),
            len,
            index,
        })
    }

    /// Iterates the table's entries in key order, loading one data block at a time.
    pub(crate) fn iter(&self) -> Result<TableIter, StoreError> {
        Ok(TableIter {
            file: File::open(&self.path)?,
            len: self.len,
            index: BlockIter::new(self.index.clone())?,
            data: None,
            failed: false,
        })
    }
}

/// Reads, verifies and decompresses the block at `handle`.
///
/// Handles that reach past the end of a `file_len`-byte file are corruption.
fn read_block(file: &mut File, file_len: u64, handle: BlockHandle) -> Result<Vec<u8>, StoreError> {
    let in_bounds = handle
        .size
        .checked_add(BLOCK_TRAILER_SIZE as u64)
        .and_then(|total| handle.offset.checked_add(total))
        .is_some_and(|end| end <= file_len);
    if !in_bounds {
        return Err(StoreError::corruption(format!(
            "block handle {}+{} lies outside the {file_len}-byte table",
            handle.offset, handle.size
        )));
    }
    let size = usize::try_from(handle.size)
        .map_err(|_| StoreError::corruption("block size overflow"))?;
    let mut raw = vec![0u8; size + BLOCK_TRAILER_SIZE];
    file.seek(SeekFrom::Start(handle.offset))?;
    file.read_exact(&mut raw)?;

    let (contents, trailer) = raw.split_at(size);
    let kind = trailer[0];
    let stored = u32::from_le_bytes([trailer[1], trailer[2], trailer[3], trailer[4]]);
    if unmask_crc(stored) != block_crc(contents, kind) {
        return Err(StoreError::corruption(format!(
            "block checksum mismatch at offset {}",
            handle.offset
        )));
    }

    match kind {
        NO_COMPRESSION => {
            raw.truncate(size);
            Ok(raw)
        }
        SNAPPY_COMPRESSION => snap::raw::Decoder::new()
            .decompress_vec(contents)
            .map_err(|e| StoreError::corruption(format!("snappy: {e}"))),
        other => Err(StoreError::corruption(format!(
            "unsupported block compression {other}"
        ))),
    }
}

pub(crate) struct TableIter {
    file: File,
    len: u64,
    index: BlockIter,
    data: Option<BlockIter>,
    failed: bool,
}

impl TableIter {
    fn advance(&mut self) -> Option<Result<InternalEntry, StoreError>> {
        loop {
            if let Some(block) = self.data.as_mut() {
                match block.next() {
                    Some(Ok((key, value))) => return Some(InternalEntry::decode(&key, value)),
                    Some(Err(e)) => return Some(Err(e)),
                    None => self.data = None,
                }
            }

            let handle = match self.index.next()? {
                Ok((_, handle)) => BlockHandle::decode(&handle),
                Err(e) => return Some(Err(e)),
            };
            let block = handle
                .and_then(|handle| read_block(&mut self.file, self.len, handle))
                .and_then(BlockIter::new);
            match block {
                Ok(block) => self.data = Some(block),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl Iterator for TableIter {
    type Item = Result<InternalEntry, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.advance();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}
