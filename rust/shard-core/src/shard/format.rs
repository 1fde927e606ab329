// rust/shard-core/src/shard/format.rs

//! Shard index and payload encoding.
//!
//! ## Index Layout
//!
//! ```text
//! +----------------------------+
//! | Magic "TIDX" (4 bytes)     |
//! +----------------------------+
//! | Version u32 (4 bytes)      |
//! +----------------------------+
//! | Flags u32 (4 bytes)        |  <- compression in the lower 2 bits
//! +----------------------------+
//! | Reserved (4 bytes)         |
//! +----------------------------+
//! | Record count u64 (8 bytes) |
//! +----------------------------+
//! | Key table len u64 (8 bytes)|
//! +----------------------------+
//! | Entries (40 bytes each)    |  <- IndexEntry, one per record
//! | ...                        |
//! +----------------------------+
//! | Key table                  |  <- UTF-8 keys, concatenated
//! +----------------------------+
//! ```
//!
//! All integers are little-endian. Entry `i` starts at
//! `HEADER_SIZE + i * ENTRY_SIZE`.

use std::collections::BTreeMap;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::config::Compression;
use crate::error::{DataError, Result};

/// Magic bytes for shard index files.
pub const MAGIC: [u8; 4] = *b"TIDX";

/// Current index format version.
pub const VERSION: u32 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 32;

/// Size of one index entry in bytes.
pub const ENTRY_SIZE: usize = 40;

/// Flag: No compression.
pub const FLAG_COMPRESSION_NONE: u32 = 0x0000;

/// Flag: Payloads are LZ4 compressed.
pub const FLAG_COMPRESSION_LZ4: u32 = 0x0001;

/// Flag: Payloads are ZSTD compressed.
pub const FLAG_COMPRESSION_ZSTD: u32 = 0x0002;

/// Compression mask (lower 2 bits).
pub const FLAG_COMPRESSION_MASK: u32 = 0x0003;

/// Fixed-size header at the start of every `.idx` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub flags: u32,
    pub record_count: u64,
    pub key_table_len: u64,
}

impl IndexHeader {
    pub fn new(compression: Compression, record_count: u64, key_table_len: u64) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: compression_to_flag(compression),
            record_count,
            key_table_len,
        }
    }

    /// Validates the magic bytes.
    pub fn validate_magic(&self) -> bool {
        self.magic == MAGIC
    }

    /// Validates the header version.
    pub fn validate_version(&self) -> bool {
        self.version == VERSION
    }

    /// Returns the payload compression, or `None` for unknown flag bits.
    pub fn compression(&self) -> Option<Compression> {
        if self.flags & !FLAG_COMPRESSION_MASK != 0 {
            return None;
        }
        compression_from_flag(self.flags)
    }

    /// Total `.idx` size implied by this header.
    pub fn expected_file_size(&self) -> Option<u64> {
        self.record_count
            .checked_mul(ENTRY_SIZE as u64)?
            .checked_add(HEADER_SIZE as u64)?
            .checked_add(self.key_table_len)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.flags.to_le_bytes());
        // bytes[12..16] reserved
        bytes[16..24].copy_from_slice(&self.record_count.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.key_table_len.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);

        Some(Self {
            magic,
            version: read_u32(bytes, 4),
            flags: read_u32(bytes, 8),
            record_count: read_u64(bytes, 16),
            key_table_len: read_u64(bytes, 24),
        })
    }
}

/// Location of one record inside the paired `.bin` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Byte offset of the stored payload in `.bin`.
    pub offset: u64,
    /// Stored (possibly compressed) payload length.
    pub length: u64,
    /// XXHash64 of the stored payload.
    pub checksum: u64,
    /// Offset of the key in the key table.
    pub key_offset: u64,
    pub key_len: u32,
}

impl IndexEntry {
    /// End offset of the payload, or `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }

    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut bytes = [0u8; ENTRY_SIZE];
        bytes[0..8].copy_from_slice(&self.offset.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.length.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.checksum.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.key_offset.to_le_bytes());
        bytes[32..36].copy_from_slice(&self.key_len.to_le_bytes());
        // bytes[36..40] reserved
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < ENTRY_SIZE {
            return None;
        }
        Some(Self {
            offset: read_u64(bytes, 0),
            length: read_u64(bytes, 8),
            checksum: read_u64(bytes, 16),
            key_offset: read_u64(bytes, 24),
            key_len: read_u32(bytes, 32),
        })
    }
}

/// Waveform stored inline when shards are written with embedded audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedAudio {
    pub channels: u16,
    /// Interleaved samples.
    pub samples: Vec<f32>,
}

/// One serialized record in a `.bin` file.
///
/// `audio` is `None` for metainfo-only shards; readers then decode `wav`
/// themselves at `sample_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPayload {
    pub key: String,
    pub wav: String,
    pub txt: String,
    pub metadata: BTreeMap<String, String>,
    pub sample_rate: u32,
    pub audio: Option<EmbeddedAudio>,
}

/// Serializes and compresses a payload.
pub fn encode_payload(
    payload: &RecordPayload,
    compression: Compression,
    level: i32,
) -> Result<Vec<u8>> {
    let raw = bincode::serialize(payload).map_err(|e| {
        DataError::serialization(format!("failed to encode record '{}': {e}", payload.key))
    })?;

    match compression {
        Compression::None => Ok(raw),
        Compression::Lz4 => Ok(lz4_flex::compress_prepend_size(&raw)),
        Compression::Zstd => zstd::encode_all(raw.as_slice(), level).map_err(|e| {
            DataError::serialization(format!(
                "zstd compression failed for '{}': {e}",
                payload.key
            ))
        }),
    }
}

/// Decompresses and deserializes a stored payload.
pub fn decode_payload(stored: &[u8], compression: Compression) -> Result<RecordPayload> {
    let raw = match compression {
        Compression::None => std::borrow::Cow::Borrowed(stored),
        Compression::Lz4 => std::borrow::Cow::Owned(
            lz4_flex::decompress_size_prepended(stored)
                .map_err(|e| DataError::serialization(format!("lz4 decompression failed: {e}")))?,
        ),
        Compression::Zstd => std::borrow::Cow::Owned(
            zstd::decode_all(stored)
                .map_err(|e| DataError::serialization(format!("zstd decompression failed: {e}")))?,
        ),
    };

    bincode::deserialize(&raw)
        .map_err(|e| DataError::serialization(format!("failed to decode record payload: {e}")))
}

/// XXHash64 (seed 0) of a byte slice.
pub fn checksum(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}

pub fn compression_to_flag(compression: Compression) -> u32 {
    match compression {
        Compression::None => FLAG_COMPRESSION_NONE,
        Compression::Lz4 => FLAG_COMPRESSION_LZ4,
        Compression::Zstd => FLAG_COMPRESSION_ZSTD,
    }
}

pub fn compression_from_flag(flag: u32) -> Option<Compression> {
    match flag & FLAG_COMPRESSION_MASK {
        FLAG_COMPRESSION_NONE => Some(Compression::None),
        FLAG_COMPRESSION_LZ4 => Some(Compression::Lz4),
        FLAG_COMPRESSION_ZSTD => Some(Compression::Zstd),
        _ => None,
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}
