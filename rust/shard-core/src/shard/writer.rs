// rust/shard-core/src/shard/writer.rs

//! Writes a single `.bin` / `.idx` shard pair.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Compression;
use crate::error::{DataError, Result};
use crate::storage::{StorageBackend, StorageWriter};

use super::format::{checksum, encode_payload, IndexEntry, IndexHeader, RecordPayload};

/// Returns the file stem for a shard id, e.g. `shard_00042`.
pub fn shard_stem(shard_id: usize) -> String {
    format!("shard_{shard_id:05}")
}

/// Paths of a published shard pair and what went into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFiles {
    pub shard_id: usize,
    pub idx_path: PathBuf,
    pub bin_path: PathBuf,
    pub records: usize,
    /// Bytes written across both files.
    pub bytes: u64,
}

/// Streams payloads into a hidden temporary `.bin` and publishes both files
/// on [`finish`](Self::finish).
///
/// Payloads go to disk as they are appended; only the index entries and key
/// table are kept in memory. The `.bin` is renamed into place before the
/// `.idx`, so a visible index always has a complete payload file. A writer
/// dropped before `finish` succeeds removes its temporary files.
pub struct ShardFileWriter {
    storage: Arc<dyn StorageBackend>,
    shard_id: usize,
    compression: Compression,
    compression_level: i32,
    bin: Option<Box<dyn StorageWriter>>,
    bin_tmp: PathBuf,
    bin_path: PathBuf,
    idx_tmp: PathBuf,
    idx_path: PathBuf,
    entries: Vec<IndexEntry>,
    key_table: Vec<u8>,
    offset: u64,
    published: bool,
}

impl ShardFileWriter {
    /// Opens the temporary payload file for `shard_id` inside `dir`.
    pub fn create(
        storage: Arc<dyn StorageBackend>,
        dir: &Path,
        shard_id: usize,
        compression: Compression,
        compression_level: i32,
    ) -> Result<Self> {
        let stem = shard_stem(shard_id);
        let bin_path = dir.join(format!("{stem}.bin"));
        let idx_path = dir.join(format!("{stem}.idx"));
        let bin_tmp = dir.join(format!(".{stem}.bin.tmp"));
        let idx_tmp = dir.join(format!(".{stem}.idx.tmp"));

        let bin = storage.open_write(&bin_tmp)?;

        Ok(Self {
            storage,
            shard_id,
            compression,
            compression_level,
            bin: Some(bin),
            bin_tmp,
            bin_path,
            idx_tmp,
            idx_path,
            entries: Vec::new(),
            key_table: Vec::new(),
            offset: 0,
            published: false,
        })
    }

    /// Number of records appended so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encodes `payload` and appends it to the payload file.
    pub fn append(&mut self, payload: &RecordPayload) -> Result<()> {
        let stored = encode_payload(payload, self.compression, self.compression_level)?;

        let bin = self
            .bin
            .as_mut()
            .ok_or_else(|| DataError::storage(&self.bin_tmp, "payload file already closed"))?;
        bin.write_all(&stored).map_err(|e| {
            DataError::storage_with_source(
                &self.bin_tmp,
                format!("failed to write record '{}'", payload.key),
                e,
            )
        })?;

        let key_len = u32::try_from(payload.key.len()).map_err(|_| {
            DataError::serialization(format!("key '{}' is too long", payload.key))
        })?;

        self.entries.push(IndexEntry {
            offset: self.offset,
            length: stored.len() as u64,
            checksum: checksum(&stored),
            key_offset: self.key_table.len() as u64,
            key_len,
        });
        self.key_table.extend_from_slice(payload.key.as_bytes());
        self.offset += stored.len() as u64;

        Ok(())
    }

    /// Writes the index and renames both files into place.
    pub fn finish(mut self) -> Result<ShardFiles> {
        let bin = self
            .bin
            .take()
            .ok_or_else(|| DataError::storage(&self.bin_tmp, "payload file already closed"))?;
        bin.finish()?;

        let header = IndexHeader::new(
            self.compression,
            self.entries.len() as u64,
            self.key_table.len() as u64,
        );

        let mut index = Vec::with_capacity(
            header.expected_file_size().unwrap_or_default() as usize,
        );
        index.extend_from_slice(&header.to_bytes());
        for entry in &self.entries {
            index.extend_from_slice(&entry.to_bytes());
        }
        index.extend_from_slice(&self.key_table);

        let mut idx = self.storage.open_write(&self.idx_tmp)?;
        idx.write_all(&index).map_err(|e| {
            DataError::storage_with_source(&self.idx_tmp, "failed to write shard index", e)
        })?;
        idx.finish()?;

        self.storage.rename(&self.bin_tmp, &self.bin_path)?;
        self.storage.rename(&self.idx_tmp, &self.idx_path)?;
        self.published = true;

        tracing::debug!(
            shard = self.shard_id,
            records = self.entries.len(),
            bytes = self.offset,
            "wrote shard"
        );

        Ok(ShardFiles {
            shard_id: self.shard_id,
            idx_path: self.idx_path.clone(),
            bin_path: self.bin_path.clone(),
            records: self.entries.len(),
            bytes: self.offset + index.len() as u64,
        })
    }

    fn discard_temp_files(&self) {
        for path in [&self.bin_tmp, &self.idx_tmp] {
            if !self.storage.exists(path).unwrap_or(false) {
                continue;
            }
            if let Err(e) = self.storage.remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove temp file");
            }
        }
    }
}

impl Drop for ShardFileWriter {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        // Close the payload file before removing it.
        self.bin.take();
        self.discard_temp_files();
    }
}
