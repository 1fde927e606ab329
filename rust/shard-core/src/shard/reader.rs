// rust/shard-core/src/shard/reader.rs

//! Random-access reader for shard pairs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Compression;
use crate::error::{DataError, Result};
use crate::storage::{StorageBackend, StorageReader};

use super::format::{
    checksum, decode_payload, IndexEntry, IndexHeader, RecordPayload, ENTRY_SIZE, HEADER_SIZE,
};

/// A parsed and validated `.idx` file.
#[derive(Debug, Clone)]
pub struct ShardIndex {
    path: PathBuf,
    compression: Compression,
    entries: Vec<IndexEntry>,
    keys: Vec<String>,
}

impl ShardIndex {
    /// Reads and validates an index through the storage backend.
    pub fn load(storage: &dyn StorageBackend, path: &Path) -> Result<Self> {
        let mut reader = storage.open_read(path)?;
        let size = usize::try_from(reader.size())
            .map_err(|_| DataError::format(path, "index file too large"))?;
        let bytes = reader.read_range(0, size)?;
        Self::parse(path, &bytes)
    }

    /// Parses index bytes, checking every structural invariant.
    ///
    /// Entries must start at offset 0 and be contiguous; keys must lie inside
    /// the key table and be valid UTF-8.
    pub fn parse(path: &Path, bytes: &[u8]) -> Result<Self> {
        let header = IndexHeader::from_bytes(bytes)
            .ok_or_else(|| DataError::format(path, "index shorter than header"))?;

        if !header.validate_magic() {
            return Err(DataError::format(path, "bad magic, not a shard index"));
        }
        if !header.validate_version() {
            return Err(DataError::format(
                path,
                format!("unsupported index version {}", header.version),
            ));
        }
        let compression = header.compression().ok_or_else(|| {
            DataError::format(path, format!("unknown index flags {:#x}", header.flags))
        })?;

        let expected = header.expected_file_size();
        if expected != Some(bytes.len() as u64) {
            return Err(DataError::format(
                path,
                format!(
                    "index size {} does not match header ({} records, {} key bytes)",
                    bytes.len(),
                    header.record_count,
                    header.key_table_len
                ),
            ));
        }

        let count = header.record_count as usize;
        let key_table = &bytes[HEADER_SIZE + count * ENTRY_SIZE..];

        let mut entries = Vec::with_capacity(count);
        let mut keys = Vec::with_capacity(count);
        let mut next_offset = 0u64;

        for i in 0..count {
            let start = HEADER_SIZE + i * ENTRY_SIZE;
            let entry = IndexEntry::from_bytes(&bytes[start..start + ENTRY_SIZE])
                .ok_or_else(|| DataError::format(path, format!("truncated entry {i}")))?;

            if entry.offset != next_offset {
                return Err(DataError::format(
                    path,
                    format!(
                        "entry {i} starts at {} but previous record ends at {next_offset}",
                        entry.offset
                    ),
                ));
            }
            next_offset = entry
                .end()
                .ok_or_else(|| DataError::format(path, format!("entry {i} overflows")))?;

            let key_start = entry.key_offset as usize;
            let key_end = key_start.checked_add(entry.key_len as usize);
            let key_bytes = match key_end {
                Some(end) if end <= key_table.len() => &key_table[key_start..end],
                _ => {
                    return Err(DataError::format(
                        path,
                        format!("entry {i} key lies outside the key table"),
                    ))
                }
            };
            let key = std::str::from_utf8(key_bytes).map_err(|_| {
                DataError::format(path, format!("entry {i} key is not valid UTF-8"))
            })?;

            entries.push(entry);
            keys.push(key.to_string());
        }

        Ok(Self {
            path: path.to_path_buf(),
            compression,
            entries,
            keys,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> Option<&IndexEntry> {
        self.entries.get(index)
    }

    pub fn key(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Size the paired `.bin` file must have.
    pub fn payload_size(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.offset + e.length)
    }
}

/// Reads records from a `.bin` file through its validated index.
pub struct ShardReader {
    index: ShardIndex,
    bin_path: PathBuf,
    bin: Box<dyn StorageReader>,
    by_key: Option<HashMap<String, usize>>,
}

impl ShardReader {
    /// Opens a shard pair.
    ///
    /// # Errors
    ///
    /// Returns a format error if the index is inconsistent or does not cover
    /// the payload file exactly.
    pub fn open(
        storage: &Arc<dyn StorageBackend>,
        idx_path: &Path,
        bin_path: &Path,
    ) -> Result<Self> {
        let index = ShardIndex::load(storage.as_ref(), idx_path)?;
        let bin = storage.open_read(bin_path)?;

        if bin.size() != index.payload_size() {
            return Err(DataError::format(
                bin_path,
                format!(
                    "payload file is {} bytes but index covers {}",
                    bin.size(),
                    index.payload_size()
                ),
            ));
        }

        Ok(Self {
            index,
            bin_path: bin_path.to_path_buf(),
            bin,
            by_key: None,
        })
    }

    pub fn index(&self) -> &ShardIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Reads the stored bytes of record `index` and checks its checksum.
    pub fn read_stored(&mut self, index: usize) -> Result<Vec<u8>> {
        let entry = *self.index.entry(index).ok_or_else(|| {
            DataError::format(
                &self.bin_path,
                format!("record {index} out of range ({} records)", self.index.len()),
            )
        })?;

        let length = usize::try_from(entry.length)
            .map_err(|_| DataError::format(&self.bin_path, "record too large"))?;
        let stored = self.bin.read_range(entry.offset, length)?;

        if checksum(&stored) != entry.checksum {
            return Err(DataError::format(
                &self.bin_path,
                format!(
                    "checksum mismatch for record '{}'",
                    self.index.key(index).unwrap_or_default()
                ),
            ));
        }
        Ok(stored)
    }

    /// Reads and decodes record `index`.
    pub fn read(&mut self, index: usize) -> Result<RecordPayload> {
        let stored = self.read_stored(index)?;
        let payload = decode_payload(&stored, self.index.compression())?;

        let expected = self.index.key(index).unwrap_or_default();
        if payload.key != expected {
            return Err(DataError::format(
                &self.bin_path,
                format!(
                    "record {index} holds key '{}' but index names '{expected}'",
                    payload.key
                ),
            ));
        }
        Ok(payload)
    }

    /// Returns the position of `key` in this shard.
    pub fn find(&mut self, key: &str) -> Option<usize> {
        let index = &self.index;
        let by_key = self.by_key.get_or_insert_with(|| {
            index
                .keys()
                .enumerate()
                .map(|(i, k)| (k.to_string(), i))
                .collect()
        });
        by_key.get(key).copied()
    }

    /// Reads the record stored under `key`.
    pub fn read_by_key(&mut self, key: &str) -> Result<Option<RecordPayload>> {
        match self.find(key) {
            Some(index) => self.read(index).map(Some),
            None => Ok(None),
        }
    }

    /// Reads every record, checking checksums and payload decoding.
    pub fn verify(&mut self) -> Result<()> {
        for i in 0..self.len() {
            self.read(i)?;
        }
        tracing::debug!(
            path = %self.bin_path.display(),
            records = self.len(),
            "verified shard"
        );
        Ok(())
    }
}
