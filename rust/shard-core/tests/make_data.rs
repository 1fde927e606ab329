// rust/shard-core/tests/make_data.rs

//! End-to-end: WAV files and a JSONL manifest in, shards out, samples back.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shard_core::{
    AudioDecoder, Compression, DataConfig, DataList, Datapipe, DatasetWriter, Datatypes,
    LocalStorage, StorageBackend, StorageConfig, SymphoniaDecoder, WriterConfig,
};
use tempfile::TempDir;

const NUM_UTTS: usize = 5;

struct Fixture {
    dir: TempDir,
    storage: Arc<dyn StorageBackend>,
    /// key -> (wav path, transcript)
    expected: HashMap<String, (String, String)>,
}

fn write_wav(path: &Path, seed: usize, frames: usize) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        let phase = (i * (seed + 3)) as f32 * 0.01;
        writer.write_sample((phase.sin() * 12000.0) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let audio_dir = dir.path().join("audio");
    std::fs::create_dir_all(&audio_dir).unwrap();

    let mut expected = HashMap::new();
    let mut jsonl = String::new();
    for i in 0..NUM_UTTS {
        let key = format!("BAC009S0002W{i:04}");
        let wav = audio_dir.join(format!("{key}.wav"));
        write_wav(&wav, i, 1600 + 400 * i);

        let wav = wav.to_string_lossy().into_owned();
        let txt = format!("transcript number {i}");
        jsonl.push_str(&format!(
            "{{\"key\": \"{key}\", \"wav\": \"{wav}\", \"txt\": \"{txt}\", \"spk\": \"S0002\"}}\n"
        ));
        expected.insert(key, (wav, txt));
    }
    std::fs::write(dir.path().join("data.jsonl"), jsonl).unwrap();

    let storage: Arc<dyn StorageBackend> = Arc::new(
        LocalStorage::new(&StorageConfig {
            base_path: dir.path().to_path_buf(),
            mmap_threshold: 4096,
            ..Default::default()
        })
        .unwrap(),
    );

    Fixture {
        dir,
        storage,
        expected,
    }
}

fn make_data(fx: &Fixture, save_dir: &str, per_shard: usize, workers: usize) -> PathBuf {
    let config = WriterConfig {
        save_dir: PathBuf::from(save_dir),
        jsonl_path: PathBuf::from("data.jsonl"),
        num_utt_per_shard: per_shard,
        audio_resample: 16000,
        num_workers: workers,
        datatypes: Datatypes::AudioMetainfo,
        ..Default::default()
    };
    let writer =
        DatasetWriter::new(fx.storage.clone(), config, Arc::new(SymphoniaDecoder::new())).unwrap();
    let summary = writer.run().unwrap();

    assert_eq!(summary.records, NUM_UTTS);
    assert_eq!(summary.shards, NUM_UTTS.div_ceil(per_shard));
    summary.manifest_path
}

fn replay_config(manifest: &Path) -> DataConfig {
    DataConfig {
        datalist_path: manifest.to_path_buf(),
        datalist_shuffling: false,
        datalist_sharding: false,
        datalist_epoch: 1,
        dataset_shuffling: false,
        audio_speed_perturb: false,
        audiofeat_spec_aug: false,
        audiofeat_spec_sub: false,
        audiofeat_spec_trim: false,
        audiofeat_dither: 0.0,
        ..Default::default()
    }
}

#[test]
fn test_make_data_round_trip() {
    for per_shard in [1, 2] {
        let fx = fixture();
        let save_dir = format!("tmp/{per_shard}sample_per_shard");
        let manifest = make_data(&fx, &save_dir, per_shard, 1);

        let config = Arc::new(replay_config(&manifest));
        let pipe = Datapipe::new(fx.storage.clone(), config, 0, 1).unwrap();
        let decoder = SymphoniaDecoder::new();

        let mut seen = HashSet::new();
        for sample in &pipe {
            let sample = sample.unwrap();
            let (wav, txt) = &fx.expected[&sample.key];
            assert_eq!(&sample.wav, wav);
            assert_eq!(&sample.txt, txt);
            assert_eq!(sample.metadata.get("spk").map(String::as_str), Some("S0002"));

            let direct = decoder.decode(wav, 16000).unwrap();
            assert_eq!(sample.waveform, direct);

            let pcm: Vec<f32> = hound::WavReader::open(wav)
                .unwrap()
                .samples::<i16>()
                .map(|s| s.unwrap() as f32 / 32768.0)
                .collect();
            assert_eq!(sample.waveform.samples, pcm);

            seen.insert(sample.key);
        }
        assert_eq!(seen.len(), NUM_UTTS);
    }
}

#[test]
fn test_shard_files_on_disk() {
    let fx = fixture();
    let manifest = make_data(&fx, "out", 2, 2);

    let shard_dir = fx.dir.path().join("out/shards");
    let mut names: Vec<String> = std::fs::read_dir(&shard_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "shard_00000.bin",
            "shard_00000.idx",
            "shard_00001.bin",
            "shard_00001.idx",
            "shard_00002.bin",
            "shard_00002.idx",
        ]
    );

    let text = std::fs::read_to_string(fx.dir.path().join(&manifest)).unwrap();
    assert_eq!(
        text.lines().next(),
        Some("shards/shard_00000.idx\tshards/shard_00000.bin")
    );

    let list = DataList::load(fx.storage.as_ref(), &manifest).unwrap();
    assert_eq!(list.verify(fx.storage.as_ref()).unwrap(), NUM_UTTS);
}

#[test]
fn test_content_hash_is_stable() {
    let fx = fixture();

    let checksum = |save_dir: &str, per_shard: usize, workers: usize| {
        let manifest = make_data(&fx, save_dir, per_shard, workers);
        DataList::load(fx.storage.as_ref(), &manifest)
            .unwrap()
            .combined_checksum(fx.storage.as_ref())
            .unwrap()
    };

    let first = checksum("run_a", 2, 1);
    assert_eq!(first, checksum("run_b", 2, 1));
    assert_eq!(first, checksum("run_c", 2, 3));
    assert_ne!(first, checksum("run_d", 1, 1));
}

#[test]
fn test_compressed_and_metainfo_shards_replay_identically() {
    let fx = fixture();
    let baseline = make_data(&fx, "plain", 2, 1);

    let config = WriterConfig {
        save_dir: PathBuf::from("packed"),
        jsonl_path: PathBuf::from("data.jsonl"),
        num_utt_per_shard: 2,
        datatypes: Datatypes::Metainfo,
        compression: Compression::Zstd,
        ..Default::default()
    };
    DatasetWriter::new(fx.storage.clone(), config, Arc::new(SymphoniaDecoder::new()))
        .unwrap()
        .run()
        .unwrap();

    let read = |manifest: &Path| {
        let pipe =
            Datapipe::new(fx.storage.clone(), Arc::new(replay_config(manifest)), 0, 1).unwrap();
        pipe.iter().map(|s| s.unwrap()).collect::<Vec<_>>()
    };

    let plain = read(&baseline);
    let packed = read(Path::new("packed/data.list"));
    assert_eq!(plain, packed);
}

#[test]
fn test_ranks_partition_the_dataset() {
    let fx = fixture();
    let manifest = make_data(&fx, "out", 1, 2);

    let config = Arc::new(DataConfig {
        datalist_shuffling: true,
        datalist_sharding: true,
        dataset_shuffling: true,
        seed: 1234,
        ..replay_config(&manifest)
    });

    let world_size = 2;
    let mut all = Vec::new();
    for rank in 0..world_size {
        let pipe = Datapipe::new(fx.storage.clone(), config.clone(), rank, world_size).unwrap();
        let keys: Vec<String> = pipe.iter().map(|s| s.unwrap().key).collect();
        assert_eq!(keys.len(), pipe.shards_for_epoch(0).len());
        all.extend(keys);
    }

    all.sort();
    let mut expected: Vec<String> = fx.expected.keys().cloned().collect();
    expected.sort();
    assert_eq!(all, expected);
}

#[test]
fn test_bad_audio_fails_without_manifest() {
    let fx = fixture();
    let broken = fx.dir.path().join("audio/broken.wav");
    std::fs::write(&broken, b"RIFF....not really").unwrap();

    let mut jsonl = std::fs::read_to_string(fx.dir.path().join("data.jsonl")).unwrap();
    jsonl.push_str(&format!(
        "{{\"key\": \"broken\", \"wav\": \"{}\", \"txt\": \"x\"}}\n",
        broken.display()
    ));
    std::fs::write(fx.dir.path().join("data.jsonl"), jsonl).unwrap();

    let config = WriterConfig {
        save_dir: PathBuf::from("out"),
        jsonl_path: PathBuf::from("data.jsonl"),
        num_utt_per_shard: 2,
        ..Default::default()
    };
    let err = DatasetWriter::new(fx.storage.clone(), config, Arc::new(SymphoniaDecoder::new()))
        .unwrap()
        .run()
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("broken"), "{message}");
    assert!(message.contains("line 6"), "{message}");
    assert!(!fx.dir.path().join("out/data.list").exists());
}
