// rust/shard-core/src/storage/mod.rs

//! Storage abstraction for shard files and manifests.
//!
//! Everything that touches disk goes through [`StorageBackend`]: the writer
//! workers create shard files through it, the manifest builder renames
//! `data.list` into place with it, and the datapipe opens indexes and
//! payloads from it.
//!
//! # Example
//!
//! ```no_run
//! use shard_core::config::StorageConfig;
//! use shard_core::storage::{LocalStorage, StorageBackend};
//! use std::io::Write;
//! use std::path::Path;
//!
//! let storage = LocalStorage::new(&StorageConfig::default()).unwrap();
//!
//! let mut writer = storage.open_write(Path::new("out/blob.bin")).unwrap();
//! writer.write_all(b"payload").unwrap();
//! writer.finish().unwrap();
//!
//! let mut reader = storage.open_read(Path::new("out/blob.bin")).unwrap();
//! assert_eq!(reader.read_range(3, 4).unwrap(), b"load");
//! ```

mod local;
mod traits;

pub use local::LocalStorage;
pub use traits::{StorageBackend, StorageReader, StorageWriter};
