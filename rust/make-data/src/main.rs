//! Shard writer command line tool.
//!
//! Reads a JSON Lines manifest of labeled audio, writes indexed binary shards
//! under `<save_dir>/shards/` and publishes `<save_dir>/data.list`.
//!
//! # Usage
//!
//! ```bash
//! make-data \
//!     --save-dir data/train \
//!     --jsonl-path data/train.jsonl \
//!     --num-utt-per-shard 1000 \
//!     --audio-resample 16000 \
//!     --num-workers 8 \
//!     --datatypes audio+metainfo
//!
//! # Start from a configuration file; flags still win
//! make-data --config shards.toml --num-workers 16
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shard_core::{
    Compression, DatasetWriter, Datatypes, LocalStorage, ShardsConfig, SymphoniaDecoder,
};

/// Pack a JSONL audio manifest into indexed binary shards
#[derive(Parser, Debug)]
#[command(name = "make-data")]
#[command(about = "Pack a JSONL audio manifest into indexed binary shards")]
struct Args {
    /// Output directory for shards and data.list
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Input manifest, one JSON object per line with key, wav and txt
    #[arg(long)]
    jsonl_path: Option<PathBuf>,

    /// Records per shard
    #[arg(long)]
    num_utt_per_shard: Option<usize>,

    /// Target sample rate for decoded audio
    #[arg(long)]
    audio_resample: Option<u32>,

    /// Number of writer threads
    #[arg(long)]
    num_workers: Option<usize>,

    /// What to store per record (audio+metainfo, metainfo)
    #[arg(long)]
    datatypes: Option<Datatypes>,

    /// Payload compression (none, lz4, zstd)
    #[arg(long)]
    compression: Option<Compression>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Resolves the configuration: flags, then `TOUCH_*` environment
    /// variables, then the config file, then defaults.
    fn resolve(&self) -> shard_core::Result<ShardsConfig> {
        let mut config = match &self.config {
            Some(path) => ShardsConfig::read_file(path)?,
            None => ShardsConfig::default(),
        }
        .with_env_overrides();

        let writer = &mut config.writer;
        if let Some(v) = &self.save_dir {
            writer.save_dir = v.clone();
        }
        if let Some(v) = &self.jsonl_path {
            writer.jsonl_path = v.clone();
        }
        if let Some(v) = self.num_utt_per_shard {
            writer.num_utt_per_shard = v;
        }
        if let Some(v) = self.audio_resample {
            writer.audio_resample = v;
        }
        if let Some(v) = self.num_workers {
            writer.num_workers = v;
        }
        if let Some(v) = self.datatypes {
            writer.datatypes = v;
        }
        if let Some(v) = self.compression {
            writer.compression = v;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = args.resolve()?;

    tracing::info!("Starting make-data");
    tracing::info!("  Input: {}", config.writer.jsonl_path.display());
    tracing::info!("  Output: {}", config.writer.save_dir.display());
    tracing::info!("  Records per shard: {}", config.writer.num_utt_per_shard);
    tracing::info!("  Workers: {}", config.writer.num_workers);

    let storage = Arc::new(LocalStorage::new(&config.storage)?);
    let writer = DatasetWriter::new(storage, config.writer, Arc::new(SymphoniaDecoder::new()))?;

    let summary = writer.run().map_err(|e| {
        tracing::error!(error = %e, "make-data failed");
        e
    })?;

    println!(
        "wrote {} records into {} shards ({} bytes), manifest {}",
        summary.records,
        summary.shards,
        summary.bytes_written,
        summary.manifest_path.display()
    );

    Ok(())
}
