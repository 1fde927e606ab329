// rust/shard-core/src/writer/mod.rs

//! Dataset writer: input manifest in, shards and `data.list` out.
//!
//! Records are laid out by global position (`shard = position / N`), so the
//! files produced do not depend on how many workers wrote them. Each worker
//! thread owns one contiguous block of shard ids and shares nothing mutable
//! with the others. The manifest is published only after every worker has
//! joined without error.
//!
//! # Example
//!
//! ```ignore
//! use shard_core::{DatasetWriter, LocalStorage, SymphoniaDecoder};
//!
//! let storage = Arc::new(LocalStorage::new(&config.storage)?);
//! let writer = DatasetWriter::new(storage, config.writer, Arc::new(SymphoniaDecoder::new()))?;
//! let summary = writer.run()?;
//! println!("{} shards", summary.shards);
//! ```

mod assignment;

pub use assignment::{assign_blocks, shard_count, shard_records};

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audio::AudioDecoder;
use crate::config::WriterConfig;
use crate::error::{DataError, Result};
use crate::manifest::{DataList, ShardPair};
use crate::shard::{EmbeddedAudio, RecordPayload, ShardFileWriter, ShardFiles};
use crate::source::{Record, RecordSource};
use crate::storage::StorageBackend;

/// File name of the published manifest inside `save_dir`.
pub const DATA_LIST_NAME: &str = "data.list";

/// Directory inside `save_dir` that holds shard files.
pub const SHARD_DIR_NAME: &str = "shards";

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub shards: usize,
    pub records: usize,
    /// Bytes written across all `.bin` and `.idx` files.
    pub bytes_written: u64,
    pub manifest_path: PathBuf,
}

/// Packs records into shards with a pool of worker threads.
pub struct DatasetWriter {
    storage: Arc<dyn StorageBackend>,
    config: WriterConfig,
    decoder: Arc<dyn AudioDecoder>,
}

impl DatasetWriter {
    /// Creates a writer. The configuration is validated before any I/O.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        config: WriterConfig,
        decoder: Arc<dyn AudioDecoder>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            config,
            decoder,
        })
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.config.save_dir.join(DATA_LIST_NAME)
    }

    pub fn shard_dir(&self) -> PathBuf {
        self.config.save_dir.join(SHARD_DIR_NAME)
    }

    /// Reads `jsonl_path` and writes every record.
    pub fn run(&self) -> Result<WriteSummary> {
        let records = RecordSource::new(self.storage.clone(), &self.config.jsonl_path).read_all()?;
        self.write_records(&records)
    }

    /// Writes `records` as shards and publishes the manifest.
    ///
    /// # Errors
    ///
    /// The first worker error in shard order is returned. Shards written by
    /// other workers may remain on disk, but `data.list` is left untouched.
    pub fn write_records(&self, records: &[Record]) -> Result<WriteSummary> {
        let shard_dir = self.shard_dir();
        self.storage.create_dir_all(&shard_dir)?;

        let per_shard = self.config.num_utt_per_shard;
        let total_shards = shard_count(records.len(), per_shard);
        let blocks = assign_blocks(total_shards, self.config.num_workers);

        tracing::info!(
            records = records.len(),
            shards = total_shards,
            workers = self.config.num_workers,
            datatypes = %self.config.datatypes,
            compression = self.config.compression.as_str(),
            "writing shards"
        );

        let results: Vec<Result<Vec<ShardFiles>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = blocks
                .into_iter()
                .enumerate()
                .filter(|(_, block)| !block.is_empty())
                .map(|(worker, block)| {
                    let shard_dir = shard_dir.as_path();
                    scope.spawn(move || self.write_block(worker, block, records, shard_dir))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(DataError::storage(&shard_dir, "writer worker panicked"))
                    })
                })
                .collect()
        });

        let mut files = Vec::with_capacity(total_shards);
        for result in results {
            files.extend(result?);
        }
        files.sort_by_key(|f| f.shard_id);

        let bytes_written = files.iter().map(|f| f.bytes).sum();
        let pairs = files
            .into_iter()
            .map(|f| ShardPair::new(f.idx_path, f.bin_path))
            .collect();

        let list = DataList::new(self.manifest_path(), pairs);
        let verified = list.verify(self.storage.as_ref())?;
        if verified != records.len() {
            return Err(DataError::format(
                list.path(),
                format!(
                    "shards hold {verified} records but {} were written",
                    records.len()
                ),
            ));
        }
        list.write_atomic(self.storage.as_ref())?;

        let summary = WriteSummary {
            shards: list.len(),
            records: records.len(),
            bytes_written,
            manifest_path: list.path().to_path_buf(),
        };

        tracing::info!(
            shards = summary.shards,
            records = summary.records,
            bytes = summary.bytes_written,
            "write complete"
        );

        Ok(summary)
    }

    fn write_block(
        &self,
        worker: usize,
        block: Range<usize>,
        records: &[Record],
        shard_dir: &Path,
    ) -> Result<Vec<ShardFiles>> {
        tracing::debug!(worker, start = block.start, end = block.end, "worker started");

        let per_shard = self.config.num_utt_per_shard;
        let mut written = Vec::with_capacity(block.len());

        for shard_id in block {
            let range = shard_records(shard_id, per_shard, records.len());
            let mut writer = ShardFileWriter::create(
                self.storage.clone(),
                shard_dir,
                shard_id,
                self.config.compression,
                self.config.compression_level,
            )?;

            for record in &records[range] {
                writer.append(&self.build_payload(record)?)?;
            }
            written.push(writer.finish()?);
        }

        Ok(written)
    }

    /// Decodes the record's audio in every mode; metainfo payloads keep only
    /// the reference.
    fn build_payload(&self, record: &Record) -> Result<RecordPayload> {
        let sample_rate = self.config.audio_resample;

        let wave = self
            .decoder
            .decode(&record.wav, sample_rate)
            .map_err(|e| locate_decode_error(e, record))?;
        if wave.sample_rate != sample_rate {
            return Err(DataError::decode(
                &record.key,
                format!(
                    "decoder returned {} Hz, expected {sample_rate} Hz (line {})",
                    wave.sample_rate, record.line
                ),
            ));
        }

        let audio = self
            .config
            .datatypes
            .embeds_audio()
            .then(|| EmbeddedAudio {
                channels: wave.channels,
                samples: wave.samples,
            });

        Ok(RecordPayload {
            key: record.key.clone(),
            wav: record.wav.clone(),
            txt: record.txt.clone(),
            metadata: record.metadata.clone(),
            sample_rate,
            audio,
        })
    }
}

/// Names the record and its input line in a decode error.
fn locate_decode_error(err: DataError, record: &Record) -> DataError {
    match err {
        DataError::Decode {
            message, source, ..
        } => DataError::Decode {
            key: record.key.clone(),
            message: format!("{message} (line {})", record.line),
            source,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Waveform;
    use crate::config::{Compression, Datatypes, StorageConfig};
    use crate::shard::ShardReader;
    use crate::storage::LocalStorage;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    /// Produces a short deterministic waveform derived from the reference.
    struct FakeDecoder;

    impl AudioDecoder for FakeDecoder {
        fn decode(&self, reference: &str, target_rate: u32) -> Result<Waveform> {
            if reference.starts_with("bad") {
                return Err(DataError::decode("", "unsupported container"));
            }
            let seed = reference.len() as f32;
            Ok(Waveform {
                samples: (0..8).map(|i| (seed + i as f32) / 100.0).collect(),
                sample_rate: target_rate,
                channels: 1,
            })
        }
    }

    fn create_test_storage() -> (Arc<dyn StorageBackend>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(&StorageConfig {
            base_path: temp_dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        (Arc::new(storage), temp_dir)
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record {
                key: format!("utt{i}"),
                wav: format!("audio/utt{i}.wav"),
                txt: format!("text {i}"),
                metadata: BTreeMap::new(),
                line: i + 1,
            })
            .collect()
    }

    fn writer_config(save_dir: &str, per_shard: usize, workers: usize) -> WriterConfig {
        WriterConfig {
            save_dir: PathBuf::from(save_dir),
            num_utt_per_shard: per_shard,
            num_workers: workers,
            ..Default::default()
        }
    }

    fn make_writer(storage: &Arc<dyn StorageBackend>, config: WriterConfig) -> DatasetWriter {
        DatasetWriter::new(storage.clone(), config, Arc::new(FakeDecoder)).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let (storage, _temp) = create_test_storage();
        let result = DatasetWriter::new(storage, writer_config("out", 0, 1), Arc::new(FakeDecoder));
        assert!(matches!(result, Err(DataError::Config { .. })));
    }

    #[test]
    fn test_shard_layout() {
        let (storage, _temp) = create_test_storage();
        let writer = make_writer(&storage, writer_config("out", 2, 2));

        let summary = writer.write_records(&records(5)).unwrap();
        assert_eq!(summary.shards, 3);
        assert_eq!(summary.records, 5);
        assert_eq!(summary.manifest_path, Path::new("out/data.list"));

        let list = DataList::load(storage.as_ref(), &summary.manifest_path).unwrap();
        let sizes: Vec<usize> = list
            .pairs()
            .iter()
            .map(|p| ShardReader::open(&storage, &p.idx, &p.bin).unwrap().len())
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(list.pairs()[2].idx, Path::new("out/shards/shard_00002.idx"));
    }

    #[test]
    fn test_records_keep_input_order() {
        let (storage, _temp) = create_test_storage();
        let writer = make_writer(&storage, writer_config("out", 3, 1));
        let input = records(7);
        let summary = writer.write_records(&input).unwrap();

        let list = DataList::load(storage.as_ref(), &summary.manifest_path).unwrap();
        let mut keys = Vec::new();
        for pair in list.pairs() {
            let mut reader = ShardReader::open(&storage, &pair.idx, &pair.bin).unwrap();
            for i in 0..reader.len() {
                let payload = reader.read(i).unwrap();
                assert_eq!(payload.sample_rate, 16000);
                assert!(payload.audio.is_some());
                keys.push(payload.key);
            }
        }
        let expected: Vec<String> = input.iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_output_independent_of_worker_count() {
        let mut checksums = Vec::new();
        for workers in [1, 2, 3, 8] {
            let (storage, _temp) = create_test_storage();
            let writer = make_writer(&storage, writer_config("out", 2, workers));
            let summary = writer.write_records(&records(9)).unwrap();
            let list = DataList::load(storage.as_ref(), &summary.manifest_path).unwrap();
            checksums.push(list.combined_checksum(storage.as_ref()).unwrap());
        }
        assert!(checksums.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_metainfo_stores_references_only() {
        let (storage, _temp) = create_test_storage();
        let config = WriterConfig {
            datatypes: Datatypes::Metainfo,
            compression: Compression::Lz4,
            ..writer_config("out", 10, 1)
        };

        let summary = make_writer(&storage, config).write_records(&records(2)).unwrap();
        let list = DataList::load(storage.as_ref(), &summary.manifest_path).unwrap();
        let pair = &list.pairs()[0];
        let payload = ShardReader::open(&storage, &pair.idx, &pair.bin)
            .unwrap()
            .read(1)
            .unwrap();
        assert_eq!(payload.wav, "audio/utt1.wav");
        assert_eq!(payload.sample_rate, 16000);
        assert!(payload.audio.is_none());
    }

    #[test]
    fn test_metainfo_still_rejects_unreadable_audio() {
        let (storage, temp_dir) = create_test_storage();
        let config = WriterConfig {
            datatypes: Datatypes::Metainfo,
            ..writer_config("out", 10, 1)
        };
        let mut input = records(2);
        input[1].wav = "bad.wav".to_string();

        let err = make_writer(&storage, config).write_records(&input).unwrap_err();
        match &err {
            DataError::Decode { key, message, .. } => {
                assert_eq!(key, "utt1");
                assert!(message.contains("line 2"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!temp_dir.path().join("out/data.list").exists());
    }

    #[test]
    fn test_decode_failure_names_record_and_skips_manifest() {
        let (storage, temp_dir) = create_test_storage();
        let writer = make_writer(&storage, writer_config("out", 1, 2));
        let mut input = records(4);
        input[2].wav = "bad.wav".to_string();

        let err = writer.write_records(&input).unwrap_err();
        match &err {
            DataError::Decode { key, message, .. } => {
                assert_eq!(key, "utt2");
                assert!(message.contains("line 3"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!temp_dir.path().join("out/data.list").exists());
    }

    #[test]
    fn test_failed_run_keeps_previous_manifest() {
        let (storage, temp_dir) = create_test_storage();
        let writer = make_writer(&storage, writer_config("out", 2, 1));
        writer.write_records(&records(3)).unwrap();
        let before = std::fs::read(temp_dir.path().join("out/data.list")).unwrap();

        let mut input = records(3);
        input[0].wav = "bad.wav".to_string();
        assert!(writer.write_records(&input).is_err());

        let after = std::fs::read(temp_dir.path().join("out/data.list")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_zero_records() {
        let (storage, temp_dir) = create_test_storage();
        let writer = make_writer(&storage, writer_config("out", 2, 4));

        let summary = writer.write_records(&[]).unwrap();
        assert_eq!(summary.shards, 0);
        assert_eq!(summary.bytes_written, 0);
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("out/data.list")).unwrap(),
            ""
        );
    }

    #[test]
    fn test_run_reads_input_manifest() {
        let (storage, temp_dir) = create_test_storage();
        std::fs::write(
            temp_dir.path().join("data.jsonl"),
            concat!(
                r#"{"key": "a", "wav": "a.wav", "txt": "one", "spk": "s1"}"#,
                "\n",
                r#"{"key": "b", "wav": "b.wav", "txt": "two"}"#,
                "\n",
            ),
        )
        .unwrap();

        let config = WriterConfig {
            jsonl_path: PathBuf::from("data.jsonl"),
            ..writer_config("out", 1, 1)
        };
        let summary = make_writer(&storage, config).run().unwrap();
        assert_eq!(summary.shards, 2);

        let list = DataList::load(storage.as_ref(), &summary.manifest_path).unwrap();
        let pair = &list.pairs()[0];
        let payload = ShardReader::open(&storage, &pair.idx, &pair.bin)
            .unwrap()
            .read(0)
            .unwrap();
        assert_eq!(payload.metadata.get("spk").map(String::as_str), Some("s1"));
    }
}
