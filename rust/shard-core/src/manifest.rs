// rust/shard-core/src/manifest.rs

//! The `data.list` manifest.
//!
//! One line per shard, in shard order:
//!
//! ```text
//! shards/shard_00000.idx<TAB>shards/shard_00000.bin
//! shards/shard_00001.idx<TAB>shards/shard_00001.bin
//! ```
//!
//! Relative paths are resolved against the directory holding `data.list`.

use std::hash::Hasher;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use twox_hash::XxHash64;

use crate::error::{DataError, Result};
use crate::shard::ShardIndex;
use crate::storage::StorageBackend;

const HASH_CHUNK: usize = 64 * 1024;

/// An index file and the payload file it describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShardPair {
    pub idx: PathBuf,
    pub bin: PathBuf,
}

impl ShardPair {
    pub fn new(idx: impl Into<PathBuf>, bin: impl Into<PathBuf>) -> Self {
        Self {
            idx: idx.into(),
            bin: bin.into(),
        }
    }
}

/// An ordered list of shard pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataList {
    path: PathBuf,
    pairs: Vec<ShardPair>,
}

impl DataList {
    /// Creates a manifest that will live at `path`. Pair paths are storage
    /// paths, not relative to the manifest.
    pub fn new(path: impl Into<PathBuf>, pairs: Vec<ShardPair>) -> Self {
        Self {
            path: path.into(),
            pairs,
        }
    }

    /// Reads a manifest through the storage backend.
    pub fn load(storage: &dyn StorageBackend, path: &Path) -> Result<Self> {
        let mut reader = storage.open_read(path)?;
        let mut content = String::new();
        reader.read_to_string(&mut content).map_err(|e| {
            DataError::storage_with_source(path, "failed to read data list", e)
        })?;
        Self::parse(path, &content)
    }

    /// Parses manifest text. `path` is where the text came from and anchors
    /// relative entries.
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let mut pairs = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let line_number = idx + 1;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            let [idx_path, bin_path] = fields.as_slice() else {
                return Err(DataError::input(
                    line_number,
                    format!(
                        "expected `<index>\\t<binary>` in {}, found {} field(s)",
                        path.display(),
                        fields.len()
                    ),
                ));
            };
            if idx_path.is_empty() || bin_path.is_empty() {
                return Err(DataError::input(
                    line_number,
                    format!("empty path in {}", path.display()),
                ));
            }

            pairs.push(ShardPair::new(base.join(idx_path), base.join(bin_path)));
        }

        Ok(Self {
            path: path.to_path_buf(),
            pairs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pairs(&self) -> &[ShardPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Renders the manifest, writing paths relative to its directory where
    /// possible.
    pub fn to_text(&self) -> String {
        let base = self.path.parent().unwrap_or_else(|| Path::new(""));
        let relative = |p: &Path| -> String {
            p.strip_prefix(base)
                .unwrap_or(p)
                .to_string_lossy()
                .into_owned()
        };

        let mut text = String::new();
        for pair in &self.pairs {
            text.push_str(&relative(&pair.idx));
            text.push('\t');
            text.push_str(&relative(&pair.bin));
            text.push('\n');
        }
        text
    }

    /// Writes the manifest to a temporary file and renames it over `path`.
    pub fn write_atomic(&self, storage: &dyn StorageBackend) -> Result<()> {
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| DataError::storage(&self.path, "data list path has no file name"))?;
        let temp_path = self
            .path
            .with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

        let mut writer = storage.open_write(&temp_path)?;
        writer.write_all(self.to_text().as_bytes()).map_err(|e| {
            DataError::storage_with_source(&temp_path, "failed to write data list", e)
        })?;
        writer.finish()?;

        storage.rename(&temp_path, &self.path)?;

        tracing::info!(
            path = %self.path.display(),
            shards = self.pairs.len(),
            "published data list"
        );
        Ok(())
    }

    /// Checks that every pair exists and that each index covers its payload
    /// file exactly. Returns the total record count.
    pub fn verify(&self, storage: &dyn StorageBackend) -> Result<usize> {
        let mut records = 0;
        for pair in &self.pairs {
            let index = ShardIndex::load(storage, &pair.idx)?;
            let bin_size = storage.file_size(&pair.bin)?;
            if bin_size != index.payload_size() {
                return Err(DataError::format(
                    &pair.bin,
                    format!(
                        "payload file is {bin_size} bytes but index covers {}",
                        index.payload_size()
                    ),
                ));
            }
            records += index.len();
        }
        Ok(records)
    }

    /// XXHash64 over the contents of every listed file, in list order.
    ///
    /// Paths do not contribute, so two runs over the same input produce the
    /// same value wherever they were written.
    pub fn combined_checksum(&self, storage: &dyn StorageBackend) -> Result<u64> {
        let mut hasher = XxHash64::with_seed(0);
        for pair in &self.pairs {
            hash_file(storage, &pair.idx, &mut hasher)?;
            hash_file(storage, &pair.bin, &mut hasher)?;
        }
        Ok(hasher.finish())
    }
}

fn hash_file(storage: &dyn StorageBackend, path: &Path, hasher: &mut XxHash64) -> Result<()> {
    let mut reader = storage.open_read(path)?;
    hasher.write(&reader.size().to_le_bytes());

    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| DataError::storage_with_source(path, "failed to read for checksum", e))?;
        if n == 0 {
            break;
        }
        hasher.write(&buf[..n]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Compression, StorageConfig};
    use crate::shard::{RecordPayload, ShardFileWriter};
    use crate::storage::LocalStorage;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_storage() -> (Arc<dyn StorageBackend>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(&StorageConfig {
            base_path: temp_dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        (Arc::new(storage), temp_dir)
    }

    fn write_shard(storage: &Arc<dyn StorageBackend>, id: usize, keys: &[&str]) -> ShardPair {
        let mut writer = ShardFileWriter::create(
            storage.clone(),
            Path::new("out/shards"),
            id,
            Compression::None,
            0,
        )
        .unwrap();
        for key in keys {
            writer
                .append(&RecordPayload {
                    key: key.to_string(),
                    wav: format!("{key}.wav"),
                    txt: String::new(),
                    metadata: BTreeMap::new(),
                    sample_rate: 16000,
                    audio: None,
                })
                .unwrap();
        }
        let files = writer.finish().unwrap();
        ShardPair::new(files.idx_path, files.bin_path)
    }

    #[test]
    fn test_parse_resolves_relative_paths() {
        let list = DataList::parse(
            Path::new("out/data.list"),
            "shards/a.idx\tshards/a.bin\n\n/abs/b.idx\t/abs/b.bin\n",
        )
        .unwrap();

        assert_eq!(
            list.pairs(),
            &[
                ShardPair::new("out/shards/a.idx", "out/shards/a.bin"),
                ShardPair::new("/abs/b.idx", "/abs/b.bin"),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_malformed_line() {
        let err = DataList::parse(
            Path::new("data.list"),
            "a.idx\ta.bin\nonly-one-field\n",
        )
        .unwrap_err();
        match err {
            DataError::Input { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }

        assert!(DataList::parse(Path::new("data.list"), "a\tb\tc\n").is_err());
        assert!(DataList::parse(Path::new("data.list"), "\tb\n").is_err());
    }

    #[test]
    fn test_text_is_relative_to_list_dir() {
        let list = DataList::new(
            "out/data.list",
            vec![
                ShardPair::new("out/shards/shard_00000.idx", "out/shards/shard_00000.bin"),
                ShardPair::new("/elsewhere/x.idx", "/elsewhere/x.bin"),
            ],
        );
        assert_eq!(
            list.to_text(),
            "shards/shard_00000.idx\tshards/shard_00000.bin\n/elsewhere/x.idx\t/elsewhere/x.bin\n"
        );

        let reparsed = DataList::parse(list.path(), &list.to_text()).unwrap();
        assert_eq!(reparsed, list);
    }

    #[test]
    fn test_write_atomic_and_load() {
        let (storage, temp_dir) = create_test_storage();
        let pairs = vec![write_shard(&storage, 0, &["a", "b"]), write_shard(&storage, 1, &["c"])];
        let list = DataList::new("out/data.list", pairs);

        assert_eq!(list.verify(storage.as_ref()).unwrap(), 3);
        list.write_atomic(storage.as_ref()).unwrap();

        assert!(!temp_dir.path().join("out/.data.list.tmp").exists());
        let loaded = DataList::load(storage.as_ref(), Path::new("out/data.list")).unwrap();
        assert_eq!(loaded, list);
    }

    #[test]
    fn test_verify_reports_missing_shard() {
        let (storage, _temp) = create_test_storage();
        let list = DataList::new(
            "out/data.list",
            vec![ShardPair::new("out/shards/nope.idx", "out/shards/nope.bin")],
        );
        assert!(list.verify(storage.as_ref()).is_err());
    }

    #[test]
    fn test_combined_checksum_tracks_content() {
        let (storage, temp_dir) = create_test_storage();
        let list = DataList::new("out/data.list", vec![write_shard(&storage, 0, &["a", "b"])]);

        let first = list.combined_checksum(storage.as_ref()).unwrap();
        assert_eq!(first, list.combined_checksum(storage.as_ref()).unwrap());

        write_shard(&storage, 0, &["a", "c"]);
        let second = list.combined_checksum(storage.as_ref()).unwrap();
        assert_ne!(first, second);

        let empty = DataList::new(temp_dir.path().join("data.list"), Vec::new());
        assert!(empty.is_empty());
        assert_eq!(
            empty.combined_checksum(storage.as_ref()).unwrap(),
            XxHash64::with_seed(0).finish()
        );
    }
}
