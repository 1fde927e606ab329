// rust/shard-core/src/lib.rs

//! Sharded audio datasets.
//!
//! This crate packs a JSON Lines manifest of labeled audio into indexed
//! binary shards, publishes them through a `data.list` manifest, and streams
//! them back deterministically across the ranks of a distributed job.

pub mod audio;
pub mod config;
pub mod error;
pub mod manifest;
pub mod shard;
pub mod source;
pub mod storage;

// Re-export commonly used types for convenience
pub use audio::{AudioDecoder, SymphoniaDecoder, Waveform};
pub use config::{Compression, DataConfig, Datatypes, ShardsConfig, StorageConfig, WriterConfig};
pub use error::{DataError, Result};
pub use manifest::{DataList, ShardPair};
pub use shard::{RecordPayload, ShardFileWriter, ShardIndex, ShardReader};
pub use source::{Record, RecordSource};
pub use storage::{LocalStorage, StorageBackend, StorageReader, StorageWriter};

pub mod writer;
pub use writer::{DatasetWriter, WriteSummary};

pub mod dataset;
pub use dataset::{AugmentOptions, Datapipe, FeaturePipeline, Sample, SampleIter};
