// rust/shard-core/src/dataset/mod.rs

//! Streaming datapipe over published shards.
//!
//! For each epoch the datapipe takes the shard list from `data.list`,
//! optionally shuffles it with a seed derived from `(seed, epoch)`, keeps the
//! positions owned by this rank (`position % world_size == rank`), and then
//! streams the records of each kept shard, optionally in a shuffled order.
//!
//! Every rank computes the same shuffled list, so the shards of all ranks are
//! disjoint and together cover the whole list.
//!
//! # Example
//!
//! ```ignore
//! use shard_core::dataset::Datapipe;
//! use std::sync::Arc;
//!
//! let pipe = Datapipe::new(storage, Arc::new(config.data), rank, world_size)?;
//! for sample in &pipe {
//!     let sample = sample?;
//!     // sample.waveform, sample.txt
//! }
//! ```

mod iterator;
mod sharding;
mod traits;

pub use iterator::SampleIter;
pub use sharding::{
    assigned_positions, epoch_seed, is_assigned, record_seed, shard_seed, shuffled_order,
};
pub use traits::{AugmentOptions, FeaturePipeline, Sample};

use std::sync::Arc;

use crate::audio::{AudioDecoder, SymphoniaDecoder};
use crate::config::DataConfig;
use crate::error::{DataError, Result};
use crate::manifest::{DataList, ShardPair};
use crate::storage::StorageBackend;

/// Reads samples for one rank of a distributed job.
pub struct Datapipe {
    storage: Arc<dyn StorageBackend>,
    config: Arc<DataConfig>,
    rank: usize,
    world_size: usize,
    list: DataList,
    decoder: Arc<dyn AudioDecoder>,
    pipeline: Option<Arc<dyn FeaturePipeline>>,
    augment: AugmentOptions,
}

impl Datapipe {
    /// Creates a datapipe without a feature pipeline.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if sharding is enabled with an invalid
    /// `rank` / `world_size`, or if any augmentation option is enabled. The
    /// manifest is loaded only after these checks pass.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        config: Arc<DataConfig>,
        rank: usize,
        world_size: usize,
    ) -> Result<Self> {
        Self::build(storage, config, rank, world_size, None)
    }

    /// Creates a datapipe that forwards augmentation options to `pipeline`.
    pub fn with_pipeline(
        storage: Arc<dyn StorageBackend>,
        config: Arc<DataConfig>,
        rank: usize,
        world_size: usize,
        pipeline: Arc<dyn FeaturePipeline>,
    ) -> Result<Self> {
        Self::build(storage, config, rank, world_size, Some(pipeline))
    }

    fn build(
        storage: Arc<dyn StorageBackend>,
        config: Arc<DataConfig>,
        rank: usize,
        world_size: usize,
        pipeline: Option<Arc<dyn FeaturePipeline>>,
    ) -> Result<Self> {
        config.validate()?;

        if config.datalist_sharding {
            if world_size == 0 {
                return Err(DataError::config("world_size must be at least 1"));
            }
            if rank >= world_size {
                return Err(DataError::config(format!(
                    "rank {rank} is out of range for world_size {world_size}"
                )));
            }
        }

        let augment = AugmentOptions::from_config(&config);
        if augment.is_enabled() && pipeline.is_none() {
            return Err(DataError::config(
                "augmentation is enabled but no feature pipeline is attached",
            ));
        }

        let list = DataList::load(storage.as_ref(), &config.datalist_path)?;

        tracing::info!(
            path = %config.datalist_path.display(),
            shards = list.len(),
            rank,
            world_size,
            "datapipe ready"
        );

        Ok(Self {
            storage,
            config,
            rank,
            world_size,
            list,
            decoder: Arc::new(SymphoniaDecoder::new()),
            pipeline,
            augment,
        })
    }

    /// Replaces the decoder used for metainfo-only shards.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn AudioDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// Every shard in the manifest, in manifest order.
    pub fn data_list(&self) -> &DataList {
        &self.list
    }

    pub(crate) fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub(crate) fn decoder(&self) -> &dyn AudioDecoder {
        self.decoder.as_ref()
    }

    pub(crate) fn pipeline(&self) -> Option<&dyn FeaturePipeline> {
        self.pipeline.as_deref()
    }

    pub(crate) fn augment_options(&self) -> &AugmentOptions {
        &self.augment
    }

    /// Shards this rank reads in `epoch` (0-based), in reading order.
    pub fn shards_for_epoch(&self, epoch: u32) -> Vec<ShardPair> {
        self.assigned_shards(epoch)
            .into_iter()
            .map(|(_, pair)| pair)
            .collect()
    }

    /// Assigned shards with their position in the epoch's full list.
    pub(crate) fn assigned_shards(&self, epoch: u32) -> Vec<(usize, ShardPair)> {
        let pairs = self.list.pairs();

        let order: Vec<usize> = if self.config.datalist_shuffling {
            shuffled_order(pairs.len(), epoch_seed(self.config.seed, epoch))
        } else {
            (0..pairs.len()).collect()
        };

        order
            .into_iter()
            .enumerate()
            .filter(|(position, _)| {
                !self.config.datalist_sharding
                    || is_assigned(*position, self.rank, self.world_size)
            })
            .map(|(position, shard)| (position, pairs[shard].clone()))
            .collect()
    }

    /// Returns a fresh iterator starting at epoch 0.
    pub fn iter(&self) -> SampleIter<'_> {
        SampleIter::new(self)
    }
}

impl<'a> IntoIterator for &'a Datapipe {
    type Item = Result<Sample>;
    type IntoIter = SampleIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
