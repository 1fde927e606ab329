// rust/shard-core/src/dataset/traits.rs

use std::collections::BTreeMap;

use crate::audio::Waveform;
use crate::config::DataConfig;
use crate::error::Result;

/// A decoded record yielded by the datapipe.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub key: String,
    pub wav: String,
    pub txt: String,
    pub waveform: Waveform,
    pub metadata: BTreeMap<String, String>,
}

/// Augmentation switches forwarded to a [`FeaturePipeline`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AugmentOptions {
    pub speed_perturb: bool,
    pub spec_aug: bool,
    pub spec_sub: bool,
    pub spec_trim: bool,
    /// Dither amplitude; 0.0 disables dithering.
    pub dither: f32,
}

impl AugmentOptions {
    pub fn from_config(config: &DataConfig) -> Self {
        Self {
            speed_perturb: config.audio_speed_perturb,
            spec_aug: config.audiofeat_spec_aug,
            spec_sub: config.audiofeat_spec_sub,
            spec_trim: config.audiofeat_spec_trim,
            dither: config.audiofeat_dither,
        }
    }

    /// Returns true if any augmentation is switched on.
    pub fn is_enabled(&self) -> bool {
        self.speed_perturb || self.spec_aug || self.spec_sub || self.spec_trim || self.dither != 0.0
    }
}

/// Feature extraction and augmentation applied to each sample.
///
/// Only called when at least one option is enabled. `seed` is derived from
/// the run seed, epoch and record position so implementations can be
/// reproducible.
pub trait FeaturePipeline: Send + Sync {
    fn process(&self, sample: Sample, options: &AugmentOptions, seed: u64) -> Result<Sample>;
}
