// rust/shard-core/src/storage/local.rs

//! Local filesystem storage backend.
//!
//! Small files are read through a buffered reader; shard payload files at or
//! above `mmap_threshold` are memory-mapped so random record access does not
//! pay a syscall per seek.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::traits::{StorageBackend, StorageReader, StorageWriter};
use crate::config::StorageConfig;
use crate::error::{DataError, Result};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    buffer_size: usize,
    use_mmap: bool,
    mmap_threshold: u64,
}

impl LocalStorage {
    /// Creates a new `LocalStorage` from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base path does not exist and cannot be created.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let base_path = config.base_path.clone();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                DataError::storage_with_source(&base_path, "failed to create base directory", e)
            })?;
        }

        Ok(Self {
            base_path,
            buffer_size: config.buffer_size.max(1),
            use_mmap: config.use_mmap,
            mmap_threshold: config.mmap_threshold,
        })
    }

    /// Resolves a path relative to the base path.
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

impl StorageBackend for LocalStorage {
    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.resolve_path(path).exists())
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        let full_path = self.resolve_path(path);
        let meta = fs::metadata(&full_path).map_err(|e| {
            DataError::storage_with_source(&full_path, "failed to read metadata", e)
        })?;
        if meta.is_dir() {
            return Err(DataError::storage(&full_path, "path is a directory"));
        }
        Ok(meta.len())
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>> {
        let full_path = self.resolve_path(path);
        let file = File::open(&full_path)
            .map_err(|e| DataError::storage_with_source(&full_path, "failed to open file", e))?;

        let size = file
            .metadata()
            .map_err(|e| {
                DataError::storage_with_source(&full_path, "failed to read file metadata", e)
            })?
            .len();

        // Empty files cannot be mapped on every platform.
        if self.use_mmap && size > 0 && size >= self.mmap_threshold {
            // SAFETY: shard files are write-once; the file is opened read-only
            // and the map lives exactly as long as the reader.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
                DataError::storage_with_source(&full_path, "failed to memory-map file", e)
            })?;
            Ok(Box::new(MmapReader::new(mmap, full_path)))
        } else {
            Ok(Box::new(LocalReader::new(
                file,
                size,
                self.buffer_size,
                full_path,
            )))
        }
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>> {
        let full_path = self.resolve_path(path);

        if let Some(parent) = full_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    DataError::storage_with_source(
                        parent,
                        "failed to create parent directories",
                        e,
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&full_path)
            .map_err(|e| DataError::storage_with_source(&full_path, "failed to create file", e))?;

        Ok(Box::new(LocalWriter::new(file, self.buffer_size, full_path)))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve_path(path);
        fs::remove_file(&full_path)
            .map_err(|e| DataError::storage_with_source(&full_path, "failed to delete file", e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from_path = self.resolve_path(from);
        let to_path = self.resolve_path(to);

        fs::rename(&from_path, &to_path).map_err(|e| {
            DataError::storage_with_source(
                &from_path,
                format!("failed to rename to {}", to_path.display()),
                e,
            )
        })
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve_path(path);
        fs::create_dir_all(&full_path).map_err(|e| {
            DataError::storage_with_source(&full_path, "failed to create directories", e)
        })
    }
}

/// Buffered file reader.
struct LocalReader {
    reader: BufReader<File>,
    size: u64,
    path: PathBuf,
}

impl LocalReader {
    fn new(file: File, size: u64, buffer_size: usize, path: PathBuf) -> Self {
        Self {
            reader: BufReader::with_capacity(buffer_size, file),
            size,
            path,
        }
    }
}

impl Read for LocalReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for LocalReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl StorageReader for LocalReader {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>> {
        let end = start.checked_add(length as u64);
        if end.map_or(true, |end| end > self.size) {
            return Err(DataError::storage(
                &self.path,
                format!(
                    "read of {length} bytes at {start} exceeds file size {}",
                    self.size
                ),
            ));
        }

        self.reader.seek(SeekFrom::Start(start)).map_err(|e| {
            DataError::storage_with_source(&self.path, format!("failed to seek to {start}"), e)
        })?;

        let mut buf = vec![0u8; length];
        self.reader.read_exact(&mut buf).map_err(|e| {
            DataError::storage_with_source(
                &self.path,
                format!("failed to read {length} bytes at {start}"),
                e,
            )
        })?;

        Ok(buf)
    }
}

/// Memory-mapped file reader.
struct MmapReader {
    mmap: Mmap,
    position: u64,
    path: PathBuf,
}

impl MmapReader {
    fn new(mmap: Mmap, path: PathBuf) -> Self {
        Self {
            mmap,
            position: 0,
            path,
        }
    }
}

impl Read for MmapReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let len = self.mmap.len() as u64;
        if self.position >= len {
            return Ok(0);
        }

        let start = self.position as usize;
        let to_read = buf.len().min(self.mmap.len() - start);
        buf[..to_read].copy_from_slice(&self.mmap[start..start + to_read]);
        self.position += to_read as u64;
        Ok(to_read)
    }
}

impl Seek for MmapReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.mmap.len() as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };

        if new_pos < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek to negative position",
            ));
        }

        self.position = new_pos as u64;
        Ok(self.position)
    }
}

impl StorageReader for MmapReader {
    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>> {
        let end = start.checked_add(length as u64);
        match end {
            Some(end) if end <= self.mmap.len() as u64 => {
                Ok(self.mmap[start as usize..end as usize].to_vec())
            }
            _ => Err(DataError::storage(
                &self.path,
                format!(
                    "read of {length} bytes at {start} exceeds file size {}",
                    self.mmap.len()
                ),
            )),
        }
    }
}

/// Buffered file writer.
struct LocalWriter {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl LocalWriter {
    fn new(file: File, buffer_size: usize, path: PathBuf) -> Self {
        Self {
            writer: BufWriter::with_capacity(buffer_size, file),
            path,
        }
    }
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl StorageWriter for LocalWriter {
    fn finish(mut self: Box<Self>) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| DataError::storage_with_source(&self.path, "failed to flush writer", e))?;

        self.writer.get_ref().sync_all().map_err(|e| {
            DataError::storage_with_source(&self.path, "failed to sync file to disk", e)
        })?;

        Ok(())
    }
}
