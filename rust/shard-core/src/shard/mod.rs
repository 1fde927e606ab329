// rust/shard-core/src/shard/mod.rs

//! Shard files.
//!
//! A shard is a pair of files with a shared stem:
//!
//! - `shard_XXXXX.bin` holds the record payloads back to back.
//! - `shard_XXXXX.idx` holds a fixed header, one fixed-size entry per record
//!   (offset, length, checksum, key location) and a key table.
//!
//! The index is what makes random access O(1): entry `i` is at a fixed
//! offset, and its payload is a single ranged read of the `.bin`.
//!
//! # Example
//!
//! ```ignore
//! use shard_core::shard::{ShardFileWriter, ShardReader};
//!
//! let mut writer = ShardFileWriter::create(storage.clone(), dir, 0, Compression::Lz4, 3)?;
//! writer.append(&payload)?;
//! let files = writer.finish()?;
//!
//! let mut reader = ShardReader::open(&storage, &files.idx_path, &files.bin_path)?;
//! let first = reader.read(0)?;
//! ```

pub mod format;
mod reader;
mod writer;

pub use format::{EmbeddedAudio, IndexEntry, IndexHeader, RecordPayload};
pub use reader::{ShardIndex, ShardReader};
pub use writer::{shard_stem, ShardFileWriter, ShardFiles};
