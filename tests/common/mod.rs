//! Writes small LevelDB stores on disk for the integration tests.
//!
//! Only what a Chrome Local Storage database needs is produced: a write-ahead
//! log, sorted tables (optionally snappy-compressed), a manifest, `CURRENT`
//! and an empty `LOCK` file.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use sollet_recover::{CiphertextRecord, Digest, KdfParams};

const LOG_BLOCK_SIZE: usize = 32 * 1024;
const LOG_HEADER_SIZE: usize = 7;
const TABLE_MAGIC: u64 = 0xdb47_7524_8b80_fb57;

pub const WALLET_KEY: &[u8] = b"_https://sollet.io\x00\x01locked";
pub const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon \
                            abandon abandon abandon abandon abandon about";
pub const SEED_HEX: &str = "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc1";

fn mask_crc(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(0xa282_ead8)
}

fn put_varint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

fn put_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    put_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn internal_key(user_key: &[u8], sequence: u64, live: bool) -> Vec<u8> {
    let mut key = user_key.to_vec();
    key.extend_from_slice(&((sequence << 8) | u64::from(live)).to_le_bytes());
    key
}

/// Log file writer: records are split across 32 KiB blocks.
#[derive(Default)]
pub struct LogWriter {
    buf: Vec<u8>,
    block_offset: usize,
}

impl LogWriter {
    pub fn add_record(&mut self, data: &[u8]) {
        let mut left = data;
        let mut begin = true;
        loop {
            let leftover = LOG_BLOCK_SIZE - self.block_offset;
            if leftover < LOG_HEADER_SIZE {
                self.buf.extend(std::iter::repeat_n(0u8, leftover));
                self.block_offset = 0;
            }

            let avail = LOG_BLOCK_SIZE - self.block_offset - LOG_HEADER_SIZE;
            let len = left.len().min(avail);
            let end = len == left.len();
            let kind = match (begin, end) {
                (true, true) => 1,
                (true, false) => 2,
                (false, false) => 3,
                (false, true) => 4,
            };
            self.emit(kind, &left[..len]);
            left = &left[len..];
            begin = false;
            if end {
                break;
            }
        }
    }

    fn emit(&mut self, kind: u8, payload: &[u8]) {
        let crc = crc32c::crc32c_append(crc32c::crc32c(&[kind]), payload);
        self.buf.extend_from_slice(&mask_crc(crc).to_le_bytes());
        self.buf
            .extend_from_slice(&(payload.len() as u16).to_le_bytes());
        self.buf.push(kind);
        self.buf.extend_from_slice(payload);
        self.block_offset += LOG_HEADER_SIZE + payload.len();
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Encodes a write batch; `None` values are deletions.
pub fn encode_batch(sequence: u64, ops: &[(&[u8], Option<&[u8]>)]) -> Vec<u8> {
    let mut out = sequence.to_le_bytes().to_vec();
    out.extend_from_slice(&(ops.len() as u32).to_le_bytes());
    for (key, value) in ops {
        match value {
            Some(value) => {
                out.push(1);
                put_prefixed(&mut out, key);
                put_prefixed(&mut out, value);
            }
            None => {
                out.push(0);
                put_prefixed(&mut out, key);
            }
        }
    }
    out
}

struct BlockBuilder {
    buf: Vec<u8>,
    restarts: Vec<u32>,
    counter: usize,
    interval: usize,
    last_key: Vec<u8>,
}

impl BlockBuilder {
    fn new(interval: usize) -> Self {
        Self {
            buf: Vec::new(),
            restarts: vec![0],
            counter: 0,
            interval,
            last_key: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn add(&mut self, key: &[u8], value: &[u8]) {
        let shared = if self.counter < self.interval {
            self.last_key
                .iter()
                .zip(key)
                .take_while(|(a, b)| a == b)
                .count()
        } else {
            self.restarts.push(self.buf.len() as u32);
            self.counter = 0;
            0
        };

        put_varint(&mut self.buf, shared as u64);
        put_varint(&mut self.buf, (key.len() - shared) as u64);
        put_varint(&mut self.buf, value.len() as u64);
        self.buf.extend_from_slice(&key[shared..]);
        self.buf.extend_from_slice(value);
        self.last_key = key.to_vec();
        self.counter += 1;
    }

    fn finish(mut self) -> Vec<u8> {
        for restart in &self.restarts {
            self.buf.extend_from_slice(&restart.to_le_bytes());
        }
        self.buf
            .extend_from_slice(&(self.restarts.len() as u32).to_le_bytes());
        self.buf
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableOptions {
    pub snappy: bool,
    pub block_size: usize,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            snappy: false,
            block_size: 4096,
        }
    }
}

/// Appends a block and its trailer; returns the encoded block handle.
fn write_block(file: &mut Vec<u8>, contents: Vec<u8>, snappy: bool) -> Vec<u8> {
    let (kind, body) = if snappy {
        let compressed = snap::raw::Encoder::new()
            .compress_vec(&contents)
            .unwrap();
        (1u8, compressed)
    } else {
        (0u8, contents)
    };

    let mut handle = Vec::new();
    put_varint(&mut handle, file.len() as u64);
    put_varint(&mut handle, body.len() as u64);

    let crc = crc32c::crc32c_append(crc32c::crc32c(&body), &[kind]);
    file.extend_from_slice(&body);
    file.push(kind);
    file.extend_from_slice(&mask_crc(crc).to_le_bytes());
    handle
}

/// Builds a table from internal entries, which must already be sorted.
pub fn encode_table(entries: &[(Vec<u8>, Vec<u8>)], options: TableOptions) -> Vec<u8> {
    let mut file = Vec::new();
    let mut index = BlockBuilder::new(1);
    let mut data = BlockBuilder::new(16);

    for (key, value) in entries {
        data.add(key, value);
        if data.buf.len() >= options.block_size {
            let last = data.last_key.clone();
            let full = std::mem::replace(&mut data, BlockBuilder::new(16));
            let handle = write_block(&mut file, full.finish(), options.snappy);
            index.add(&last, &handle);
        }
    }
    if !data.is_empty() {
        let last = data.last_key.clone();
        let handle = write_block(&mut file, data.finish(), options.snappy);
        index.add(&last, &handle);
    }

    let metaindex = write_block(&mut file, BlockBuilder::new(1).finish(), false);
    let index = write_block(&mut file, index.finish(), false);

    file.extend_from_slice(&footer(&metaindex, &index));
    file
}

fn footer(metaindex: &[u8], index: &[u8]) -> Vec<u8> {
    let mut footer = Vec::with_capacity(48);
    footer.extend_from_slice(metaindex);
    footer.extend_from_slice(index);
    footer.resize(40, 0);
    footer.extend_from_slice(&TABLE_MAGIC.to_le_bytes());
    footer
}

/// A table footer with a valid magic whose handles point wherever the caller says.
pub fn raw_footer(metaindex: (u64, u64), index: (u64, u64)) -> Vec<u8> {
    let handle = |(offset, size): (u64, u64)| {
        let mut out = Vec::new();
        put_varint(&mut out, offset);
        put_varint(&mut out, size);
        out
    };
    footer(&handle(metaindex), &handle(index))
}

struct TableMeta {
    number: u64,
    size: u64,
    smallest: Vec<u8>,
    largest: Vec<u8>,
}

/// Lays out a store one write at a time. Sequence numbers follow call order,
/// so later calls shadow earlier ones.
pub struct StoreBuilder {
    dir: PathBuf,
    sequence: u64,
    next_file: u64,
    log: LogWriter,
    tables: Vec<TableMeta>,
    dropped: Vec<u64>,
    comparator: String,
}

impl StoreBuilder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        fs::create_dir_all(&dir).unwrap();
        Self {
            dir,
            sequence: 0,
            next_file: 2,
            log: LogWriter::default(),
            tables: Vec::new(),
            dropped: Vec::new(),
            comparator: "leveldb.BytewiseComparator".to_string(),
        }
    }

    pub fn comparator(&mut self, name: &str) -> &mut Self {
        self.comparator = name.to_string();
        self
    }

    /// Writes one batch to the live log.
    pub fn batch(&mut self, ops: &[(&[u8], Option<&[u8]>)]) -> &mut Self {
        let first = self.sequence + 1;
        self.sequence += ops.len() as u64;
        self.log.add_record(&encode_batch(first, ops));
        self
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> &mut Self {
        self.batch(&[(key, Some(value))])
    }

    pub fn delete(&mut self, key: &[u8]) -> &mut Self {
        self.batch(&[(key, None)])
    }

    /// Several text writes as one batch.
    pub fn put_all(&mut self, ops: &[(&str, &str)]) -> &mut Self {
        let ops: Vec<(&[u8], Option<&[u8]>)> = ops
            .iter()
            .map(|(key, value)| (key.as_bytes(), Some(value.as_bytes())))
            .collect();
        self.batch(&ops)
    }

    /// Writes a level-0 table holding `entries`; returns its path.
    pub fn table(&mut self, entries: &[(&str, Option<&str>)], options: TableOptions) -> PathBuf {
        let mut rows: Vec<(&str, u64, Option<&str>)> = entries
            .iter()
            .map(|&(key, value)| {
                self.sequence += 1;
                (key, self.sequence, value)
            })
            .collect();
        // user key ascending, newest first
        rows.sort_by(|a, b| a.0.cmp(b.0).then(b.1.cmp(&a.1)));
        let sorted: Vec<(Vec<u8>, Vec<u8>)> = rows
            .iter()
            .map(|&(key, sequence, value)| {
                (
                    internal_key(key.as_bytes(), sequence, value.is_some()),
                    value.unwrap_or_default().as_bytes().to_vec(),
                )
            })
            .collect();

        let number = self.next_file;
        self.next_file += 1;
        let path = self.dir.join(format!("{number:06}.ldb"));
        let bytes = encode_table(&sorted, options);
        fs::write(&path, &bytes).unwrap();

        self.tables.push(TableMeta {
            number,
            size: bytes.len() as u64,
            smallest: sorted.first().map(|e| e.0.clone()).unwrap_or_default(),
            largest: sorted.last().map(|e| e.0.clone()).unwrap_or_default(),
        });
        path
    }

    /// Writes a table and then records it as deleted, as a compaction would.
    pub fn dropped_table(&mut self, entries: &[(&str, Option<&str>)]) -> PathBuf {
        let path = self.table(entries, TableOptions::default());
        if let Some(meta) = self.tables.last() {
            self.dropped.push(meta.number);
        }
        path
    }

    /// Writes a log that the manifest says is already compacted away.
    pub fn stale_log(&mut self, ops: &[(&str, &str)]) -> PathBuf {
        let number = self.next_file;
        self.next_file += 1;
        let ops: Vec<(&[u8], Option<&[u8]>)> = ops
            .iter()
            .map(|(key, value)| (key.as_bytes(), Some(value.as_bytes())))
            .collect();
        let mut log = LogWriter::default();
        log.add_record(&encode_batch(self.sequence + 1, &ops));
        self.sequence += ops.len() as u64;

        let path = self.dir.join(format!("{number:06}.log"));
        fs::write(&path, log.into_bytes()).unwrap();
        path
    }

    /// Writes the live log, manifest, `CURRENT` and `LOCK`; returns the store directory.
    pub fn finish(&mut self) -> PathBuf {
        let log_number = self.next_file;
        let manifest_number = log_number + 1;
        let log = std::mem::take(&mut self.log);
        fs::write(
            self.dir.join(format!("{log_number:06}.log")),
            log.into_bytes(),
        )
        .unwrap();

        let mut first = Vec::new();
        put_varint(&mut first, 1);
        put_prefixed(&mut first, self.comparator.as_bytes());
        put_varint(&mut first, 2);
        put_varint(&mut first, log_number);
        put_varint(&mut first, 3);
        put_varint(&mut first, manifest_number + 1);
        put_varint(&mut first, 4);
        put_varint(&mut first, self.sequence);
        for table in &self.tables {
            put_varint(&mut first, 7);
            put_varint(&mut first, 0);
            put_varint(&mut first, table.number);
            put_varint(&mut first, table.size);
            put_prefixed(&mut first, &table.smallest);
            put_prefixed(&mut first, &table.largest);
        }

        let mut second = Vec::new();
        for number in &self.dropped {
            put_varint(&mut second, 6);
            put_varint(&mut second, 0);
            put_varint(&mut second, *number);
        }

        let mut manifest = LogWriter::default();
        manifest.add_record(&first);
        if !second.is_empty() {
            manifest.add_record(&second);
        }
        let manifest_name = format!("MANIFEST-{manifest_number:06}");
        fs::write(self.dir.join(&manifest_name), manifest.into_bytes()).unwrap();
        fs::write(self.dir.join("CURRENT"), format!("{manifest_name}\n")).unwrap();
        fs::write(self.dir.join("LOCK"), b"").unwrap();

        self.dir.clone()
    }
}

/// Plaintext the wallet encrypts: seed phrase, hex seed and derivation path.
pub fn wallet_plaintext() -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "mnemonic": MNEMONIC,
        "seed": SEED_HEX,
        "derivationPath": "bip44Change",
    }))
    .unwrap()
}

/// A record sealed with a cheap KDF so tests stay fast.
pub fn sealed_record(password: &str) -> CiphertextRecord {
    let kdf = KdfParams::new(1_000, Digest::Sha256).unwrap();
    CiphertextRecord::seal(&wallet_plaintext(), password, kdf).unwrap()
}

/// The stored form of a Local Storage value: a format byte, then the JSON text.
pub fn local_storage_value(record: &CiphertextRecord) -> Vec<u8> {
    let mut value = vec![0x01];
    value.extend(serde_json::to_vec(record).unwrap());
    value
}

/// A Local Storage database at `dir` holding the wallet among other origins' keys.
pub fn wallet_store(dir: &Path, password: &str) -> PathBuf {
    let value = local_storage_value(&sealed_record(password));
    let mut builder = StoreBuilder::new(dir);
    builder.put(b"VERSION", b"1");
    builder.put(b"META:https://sollet.io", b"\x08\x80\x80\x80\x80\x10\x10\x42");
    builder.put(b"_https://example.com\x00\x01theme", b"\x01dark");
    builder.put(WALLET_KEY, &value);
    builder.put(b"_https://sollet.io\x00\x01walletSelector", b"\x01{}");
    builder.finish()
}

/// A directory laid out like a browser profile: `<root>/<profile>/Local Storage/leveldb`.
pub fn profile_store_dir(root: &Path, profile: &str) -> PathBuf {
    root.join(profile).join("Local Storage").join("leveldb")
}
