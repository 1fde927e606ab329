// rust/shard-core/src/config.rs

//! Configuration for shard writing and streaming reads.
//!
//! Configuration is parsed from TOML files, overridden from `TOUCH_*`
//! environment variables and validated once. The reader side
//! ([`DataConfig`]) is frozen behind an `Arc` when a datapipe is built.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{DataError, Result};

// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardsConfig {
    pub storage: StorageConfig,
    pub writer: WriterConfig,
    pub data: DataConfig,
}

// Storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Base path that relative paths are resolved against.
    pub base_path: PathBuf,
    // Buffer size in bytes for I/O operations.
    pub buffer_size: usize,
    // Whether to memory-map shard files for reading.
    pub use_mmap: bool,
    // File size threshold (bytes) above which to use mmap.
    pub mmap_threshold: u64,
}

/// Which record fields are embedded in the binary payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Datatypes {
    /// Decoded waveform and metadata are both stored in the shard.
    #[default]
    #[serde(rename = "audio+metainfo")]
    AudioMetainfo,
    /// Only metadata and the audio reference are stored; audio is decoded
    /// from the reference at read time.
    #[serde(rename = "metainfo")]
    Metainfo,
}

impl Datatypes {
    pub fn as_str(&self) -> &'static str {
        match self {
            Datatypes::AudioMetainfo => "audio+metainfo",
            Datatypes::Metainfo => "metainfo",
        }
    }

    pub fn embeds_audio(&self) -> bool {
        matches!(self, Datatypes::AudioMetainfo)
    }
}

impl FromStr for Datatypes {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "audio+metainfo" => Ok(Datatypes::AudioMetainfo),
            "metainfo" => Ok(Datatypes::Metainfo),
            other => Err(DataError::config(format!(
                "unknown datatypes '{other}'. Expected 'audio+metainfo' or 'metainfo'"
            ))),
        }
    }
}

impl fmt::Display for Datatypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compression applied to each record payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Lz4,
    Zstd,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }
}

impl FromStr for Compression {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd),
            other => Err(DataError::config(format!(
                "unknown compression '{other}'. Expected one of: none, lz4, zstd"
            ))),
        }
    }
}

// Shard writer options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    // Output directory for shards and data.list.
    pub save_dir: PathBuf,
    // Input JSONL manifest.
    pub jsonl_path: PathBuf,
    // Records per shard (the last shard may hold fewer).
    pub num_utt_per_shard: usize,
    // Target sample rate handed to the decoder.
    pub audio_resample: u32,
    // Number of writer threads.
    pub num_workers: usize,
    // Which fields are embedded in the payload.
    pub datatypes: Datatypes,
    // Payload compression.
    pub compression: Compression,
    // Compression level (zstd only).
    pub compression_level: i32,
}

/// Streaming datapipe options.
///
/// Built once per run and never mutated after a `Datapipe` is constructed
/// from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Path of the `data.list` produced by the writer.
    pub datalist_path: PathBuf,
    /// Permute the shard list once per epoch.
    pub datalist_shuffling: bool,
    /// Partition the shard list across ranks.
    pub datalist_sharding: bool,
    /// Number of passes over the partitioned list.
    pub datalist_epoch: u32,
    /// Permute records inside each shard.
    pub dataset_shuffling: bool,
    /// Base seed for every shuffle.
    pub seed: u64,
    /// Fail on a malformed record instead of skipping it.
    pub strict: bool,
    pub audio_speed_perturb: bool,
    pub audiofeat_spec_aug: bool,
    pub audiofeat_spec_sub: bool,
    pub audiofeat_spec_trim: bool,
    pub audiofeat_dither: f32,
}

impl DataConfig {
    pub fn validate(&self) -> Result<()> {
        if self.datalist_epoch == 0 {
            return Err(DataError::config(
                "data.datalist_epoch must be greater than 0",
            ));
        }
        if !self.audiofeat_dither.is_finite() || self.audiofeat_dither < 0.0 {
            return Err(DataError::config(
                "data.audiofeat_dither must be a finite, non-negative number",
            ));
        }
        Ok(())
    }
}

impl WriterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_utt_per_shard == 0 {
            return Err(DataError::config(
                "writer.num_utt_per_shard must be greater than 0",
            ));
        }
        if self.num_workers == 0 {
            return Err(DataError::config(
                "writer.num_workers must be greater than 0",
            ));
        }
        if self.audio_resample == 0 {
            return Err(DataError::config(
                "writer.audio_resample must be greater than 0",
            ));
        }
        if self.compression == Compression::Zstd && !(1..=22).contains(&self.compression_level) {
            return Err(DataError::config(
                "writer.compression_level must be between 1 and 22 for zstd",
            ));
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            buffer_size: 64 * 1024, // 64 KB
            use_mmap: true,
            mmap_threshold: 1024 * 1024, // 1 MB
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("./shards"),
            jsonl_path: PathBuf::from("./data.jsonl"),
            num_utt_per_shard: 1000,
            audio_resample: 16000,
            num_workers: 1,
            datatypes: Datatypes::AudioMetainfo,
            compression: Compression::None,
            compression_level: 3,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            datalist_path: PathBuf::from("./data.list"),
            datalist_shuffling: true,
            datalist_sharding: true,
            datalist_epoch: 1,
            dataset_shuffling: true,
            seed: 0,
            strict: true,
            audio_speed_perturb: false,
            audiofeat_spec_aug: false,
            audiofeat_spec_sub: false,
            audiofeat_spec_trim: false,
            audiofeat_dither: 0.0,
        }
    }
}

impl FromStr for ShardsConfig {
    type Err = DataError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| DataError::config_with_source("failed to parse TOML config", e))
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl ShardsConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed, or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file without validating it, for callers that
    /// apply overrides before calling [`ShardsConfig::validate`].
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DataError::storage_with_source(path, "failed to read config file", e)
        })?;
        content.parse()
    }

    // Apply environment variable overrides.
    //
    // Variables are prefixed with `TOUCH_` followed by the section and field
    // name, e.g. `TOUCH_WRITER_NUM_WORKERS` or `TOUCH_DATA_SEED`. Values that
    // fail to parse are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Storage overrides
        if let Ok(val) = std::env::var("TOUCH_STORAGE_BASE_PATH") {
            self.storage.base_path = PathBuf::from(val);
        }
        if let Some(v) = env_parse("TOUCH_STORAGE_BUFFER_SIZE") {
            self.storage.buffer_size = v;
        }
        if let Some(v) = env_parse("TOUCH_STORAGE_USE_MMAP") {
            self.storage.use_mmap = v;
        }
        if let Some(v) = env_parse("TOUCH_STORAGE_MMAP_THRESHOLD") {
            self.storage.mmap_threshold = v;
        }

        // Writer overrides
        if let Ok(val) = std::env::var("TOUCH_WRITER_SAVE_DIR") {
            self.writer.save_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("TOUCH_WRITER_JSONL_PATH") {
            self.writer.jsonl_path = PathBuf::from(val);
        }
        if let Some(v) = env_parse("TOUCH_WRITER_NUM_UTT_PER_SHARD") {
            self.writer.num_utt_per_shard = v;
        }
        if let Some(v) = env_parse("TOUCH_WRITER_AUDIO_RESAMPLE") {
            self.writer.audio_resample = v;
        }
        if let Some(v) = env_parse("TOUCH_WRITER_NUM_WORKERS") {
            self.writer.num_workers = v;
        }
        if let Some(v) = env_parse("TOUCH_WRITER_DATATYPES") {
            self.writer.datatypes = v;
        }
        if let Some(v) = env_parse("TOUCH_WRITER_COMPRESSION") {
            self.writer.compression = v;
        }
        if let Some(v) = env_parse("TOUCH_WRITER_COMPRESSION_LEVEL") {
            self.writer.compression_level = v;
        }

        // Data overrides
        if let Ok(val) = std::env::var("TOUCH_DATA_DATALIST_PATH") {
            self.data.datalist_path = PathBuf::from(val);
        }
        if let Some(v) = env_parse("TOUCH_DATA_DATALIST_SHUFFLING") {
            self.data.datalist_shuffling = v;
        }
        if let Some(v) = env_parse("TOUCH_DATA_DATALIST_SHARDING") {
            self.data.datalist_sharding = v;
        }
        if let Some(v) = env_parse("TOUCH_DATA_DATALIST_EPOCH") {
            self.data.datalist_epoch = v;
        }
        if let Some(v) = env_parse("TOUCH_DATA_DATASET_SHUFFLING") {
            self.data.dataset_shuffling = v;
        }
        if let Some(v) = env_parse("TOUCH_DATA_SEED") {
            self.data.seed = v;
        }
        if let Some(v) = env_parse("TOUCH_DATA_STRICT") {
            self.data.strict = v;
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.buffer_size == 0 {
            return Err(DataError::config(
                "storage.buffer_size must be greater than 0",
            ));
        }
        self.writer.validate()?;
        self.data.validate()?;
        Ok(())
    }
}
