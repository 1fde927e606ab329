// rust/shard-core/src/storage/traits.rs

//! Storage traits used by the shard writer, the manifest builder and the
//! shard reader.

use std::io::{Read, Seek, Write};
use std::path::Path;

use crate::error::Result;

/// A handle for reading a stored file.
///
/// Extends `Read` and `Seek` with positional reads, which is how the shard
/// reader fetches a single record without touching its neighbours.
pub trait StorageReader: Read + Seek + Send {
    /// Returns the total size of the file in bytes.
    fn size(&self) -> u64;

    /// Reads exactly `length` bytes starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range extends past the end of the file.
    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>>;
}

/// A handle for writing a file.
pub trait StorageWriter: Write + Send {
    /// Flushes and syncs the file. Must be called to complete the write.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Backend that shard files and manifests are read from and written to.
///
/// Object-safe so it can be shared as `Arc<dyn StorageBackend>` between
/// writer threads.
pub trait StorageBackend: Send + Sync {
    /// Checks whether a file or directory exists.
    fn exists(&self, path: &Path) -> Result<bool>;

    /// Returns the size of a file in bytes.
    fn file_size(&self, path: &Path) -> Result<u64>;

    /// Opens a file for reading.
    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>>;

    /// Creates (or truncates) a file for writing, creating parent directories.
    fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>>;

    /// Removes a single file.
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Renames a file, replacing the destination if it exists.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Creates a directory and all missing parents.
    fn create_dir_all(&self, path: &Path) -> Result<()>;
}
