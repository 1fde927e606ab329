// rust/shard-core/src/audio/decode.rs

//! Audio decoding using symphonia, resampling with rubato.
//!
//! Integer PCM is normalized by the full-scale value of its type, so a
//! 16-bit WAV decodes to `sample / 32768.0`.

use std::fs::File;
use std::path::{Path, PathBuf};

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{AudioDecoder, Waveform};
use crate::error::{DataError, Result};

const RESAMPLE_CHUNK: usize = 1024;

/// Decodes audio files from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct SymphoniaDecoder {
    root: Option<PathBuf>,
}

impl SymphoniaDecoder {
    /// Creates a decoder that resolves relative references against the
    /// current working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder that resolves relative references against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Decodes a file at its native sample rate.
    pub fn decode_native(&self, reference: &str) -> Result<Waveform> {
        let path = self.resolve(reference);
        let file = File::open(&path).map_err(|e| {
            DataError::decode_with_source(
                "",
                format!("cannot open audio '{}'", path.display()),
                e,
            )
        })?;

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| symphonia_error(&path, e))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                DataError::decode("", format!("no audio track in '{}'", path.display()))
            })?;

        let sample_rate = track.codec_params.sample_rate.ok_or_else(|| {
            DataError::decode(
                "",
                format!("'{}' does not advertise a sample rate", path.display()),
            )
        })?;
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .unwrap_or(0);
        let track_id = track.id;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| symphonia_error(&path, e))?;

        let mut samples = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(symphonia_error(&path, e)),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = decoder
                .decode(&packet)
                .map_err(|e| symphonia_error(&path, e))?;
            if channels == 0 {
                channels = decoded.spec().channels.count();
            }
            append_samples(&decoded, &mut samples, channels).map_err(|msg| {
                DataError::decode("", format!("{msg} in '{}'", path.display()))
            })?;
        }

        let channels = u16::try_from(channels.max(1)).map_err(|_| {
            DataError::decode("", format!("too many channels in '{}'", path.display()))
        })?;

        Ok(Waveform {
            samples,
            sample_rate,
            channels,
        })
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, reference: &str, target_rate: u32) -> Result<Waveform> {
        let wave = self.decode_native(reference)?;
        if wave.sample_rate == target_rate {
            return Ok(wave);
        }
        resample(&wave, target_rate)
    }
}

fn symphonia_error(path: &Path, e: SymphoniaError) -> DataError {
    DataError::decode_with_source("", format!("cannot decode '{}'", path.display()), e)
}

fn append_samples(
    buffer: &AudioBufferRef,
    output: &mut Vec<f32>,
    channels: usize,
) -> std::result::Result<(), &'static str> {
    macro_rules! interleave {
        ($buf:expr, $convert:expr) => {{
            let buf = $buf;
            for frame in 0..buf.frames() {
                for ch in 0..channels {
                    output.push($convert(buf.chan(ch)[frame]));
                }
            }
        }};
    }

    match buffer {
        AudioBufferRef::F32(buf) => interleave!(buf, |s: f32| s),
        AudioBufferRef::F64(buf) => interleave!(buf, |s: f64| s as f32),
        AudioBufferRef::S16(buf) => interleave!(buf, |s: i16| s as f32 / 32768.0),
        AudioBufferRef::S24(buf) => interleave!(buf, |s: symphonia::core::sample::i24| {
            s.inner() as f32 / 8_388_608.0
        }),
        AudioBufferRef::S32(buf) => interleave!(buf, |s: i32| s as f32 / 2_147_483_648.0),
        AudioBufferRef::U8(buf) => interleave!(buf, |s: u8| (s as f32 - 128.0) / 128.0),
        _ => return Err("unsupported sample format"),
    }
    Ok(())
}

/// Resamples every channel with a windowed-sinc interpolator.
///
/// The resampler's group delay is trimmed so the output is aligned with the
/// input and has `round(frames * ratio)` frames.
fn resample(wave: &Waveform, target_rate: u32) -> Result<Waveform> {
    let channels = wave.channels as usize;
    let frames = wave.frames();
    if frames == 0 || wave.sample_rate == 0 {
        return Ok(Waveform {
            samples: Vec::new(),
            sample_rate: target_rate,
            channels: wave.channels,
        });
    }

    let ratio = target_rate as f64 / wave.sample_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.1, params, RESAMPLE_CHUNK, channels)
        .map_err(|e| DataError::decode_with_source("", "cannot build resampler", e))?;

    let planar: Vec<Vec<f32>> = (0..wave.channels).map(|ch| wave.channel(ch)).collect();
    let delay = resampler.output_delay();
    let expected = (frames as f64 * ratio).round() as usize;

    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];
    let mut pos = 0;
    while output[0].len() < expected + delay {
        let chunk: Vec<Vec<f32>> = planar
            .iter()
            .map(|samples| {
                let mut chunk = Vec::with_capacity(RESAMPLE_CHUNK);
                if pos < samples.len() {
                    let end = (pos + RESAMPLE_CHUNK).min(samples.len());
                    chunk.extend_from_slice(&samples[pos..end]);
                }
                // Zero padding flushes the filter tail.
                chunk.resize(RESAMPLE_CHUNK, 0.0);
                chunk
            })
            .collect();

        let resampled = resampler
            .process(&chunk, None)
            .map_err(|e| DataError::decode_with_source("", "resampling failed", e))?;
        for (out, channel) in output.iter_mut().zip(resampled) {
            out.extend_from_slice(&channel);
        }
        pos += RESAMPLE_CHUNK;
    }

    let mut samples = Vec::with_capacity(expected * channels);
    for frame in delay..delay + expected {
        for channel in &output {
            samples.push(channel[frame]);
        }
    }

    Ok(Waveform {
        samples,
        sample_rate: target_rate,
        channels: wave.channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_pcm16_normalizes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tone.wav");
        let pcm: Vec<i16> = vec![0, 16384, -16384, 32767, -32768];
        write_wav(&path, 16000, 1, &pcm);

        let decoder = SymphoniaDecoder::with_root(temp_dir.path());
        let wave = decoder.decode("tone.wav", 16000).unwrap();

        assert_eq!(wave.sample_rate, 16000);
        assert_eq!(wave.channels, 1);
        let expected: Vec<f32> = pcm.iter().map(|&s| s as f32 / 32768.0).collect();
        assert_eq!(wave.samples, expected);
    }

    #[test]
    fn test_decode_keeps_interleaving() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stereo.wav");
        write_wav(&path, 8000, 2, &[100, -100, 200, -200, 300, -300]);

        let wave = SymphoniaDecoder::new()
            .decode(path.to_str().unwrap(), 8000)
            .unwrap();

        assert_eq!(wave.channels, 2);
        assert_eq!(wave.frames(), 3);
        assert!(wave.channel(0).iter().all(|&s| s > 0.0));
        assert!(wave.channel(1).iter().all(|&s| s < 0.0));
    }

    #[test]
    fn test_decode_resamples_to_target_rate() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tone.wav");
        let pcm: Vec<i16> = (0..8000)
            .map(|i| ((i as f32 * 0.05).sin() * 8000.0) as i16)
            .collect();
        write_wav(&path, 8000, 1, &pcm);

        let wave = SymphoniaDecoder::with_root(temp_dir.path())
            .decode("tone.wav", 16000)
            .unwrap();

        assert_eq!(wave.sample_rate, 16000);
        assert_eq!(wave.frames(), 16000);
    }

    #[test]
    fn test_decode_missing_file() {
        let err = SymphoniaDecoder::new()
            .decode("/nonexistent/audio.wav", 16000)
            .unwrap_err();
        assert!(matches!(err, DataError::Decode { .. }));
    }

    #[test]
    fn test_decode_garbage_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("noise.wav"), b"definitely not audio").unwrap();

        let result = SymphoniaDecoder::with_root(temp_dir.path()).decode("noise.wav", 16000);
        assert!(matches!(result, Err(DataError::Decode { .. })));
    }
}
