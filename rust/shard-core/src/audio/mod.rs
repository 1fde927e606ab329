// rust/shard-core/src/audio/mod.rs

//! Audio decoding boundary.
//!
//! The writer and the datapipe never look inside audio containers
//! themselves; they hand an audio reference and a target sample rate to an
//! [`AudioDecoder`]. [`SymphoniaDecoder`] is the default implementation.

mod decode;

pub use decode::SymphoniaDecoder;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Decoded PCM audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Waveform {
    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Returns the samples of one channel.
    pub fn channel(&self, index: u16) -> Vec<f32> {
        if index >= self.channels {
            return Vec::new();
        }
        self.samples
            .iter()
            .skip(index as usize)
            .step_by(self.channels as usize)
            .copied()
            .collect()
    }
}

/// Decodes an audio reference into a waveform at a target sample rate.
///
/// Implementations must be deterministic: the same reference and rate must
/// always produce the same samples, otherwise shards are not reproducible.
pub trait AudioDecoder: Send + Sync {
    /// Decodes `reference`, resampling to `target_rate` when the source rate
    /// differs. Errors are `DataError::Decode`; the key may be left empty and
    /// is filled in by the caller.
    fn decode(&self, reference: &str, target_rate: u32) -> Result<Waveform>;
}
