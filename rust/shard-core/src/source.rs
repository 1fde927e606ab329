// rust/shard-core/src/source.rs

//! Input manifest reader.
//!
//! The input manifest is JSON Lines: one object per line with at least
//! `key`, `wav` and `txt`. Every other top-level field is carried along as
//! string metadata.

use std::collections::{BTreeMap, HashSet};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::error::{DataError, Result};
use crate::storage::StorageBackend;

/// One labeled audio record from the input manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    /// Audio reference (a path, resolved by the decoder).
    pub wav: String,
    pub txt: String,
    pub metadata: BTreeMap<String, String>,
    /// 1-based line number in the input manifest.
    pub line: usize,
}

impl Record {
    /// Parses a single manifest line.
    pub fn parse_line(line: &str, line_number: usize) -> Result<Self> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| DataError::input(line_number, format!("invalid JSON: {e}")))?;

        let Value::Object(mut fields) = value else {
            return Err(DataError::input(line_number, "expected a JSON object"));
        };

        let mut take = |name: &str| -> Result<String> {
            match fields.remove(name) {
                Some(Value::String(s)) => Ok(s),
                Some(_) => Err(DataError::input(
                    line_number,
                    format!("field `{name}` must be a string"),
                )),
                None => Err(DataError::input(
                    line_number,
                    format!("missing required field `{name}`"),
                )),
            }
        };

        let key = take("key")?;
        let wav = take("wav")?;
        let txt = take("txt")?;

        if key.is_empty() {
            return Err(DataError::input(line_number, "field `key` must not be empty"));
        }

        let metadata = fields
            .into_iter()
            .map(|(name, value)| {
                let text = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, text)
            })
            .collect();

        Ok(Self {
            key,
            wav,
            txt,
            metadata,
            line: line_number,
        })
    }
}

/// Reads records from a JSONL manifest through a storage backend.
pub struct RecordSource {
    storage: Arc<dyn StorageBackend>,
    path: PathBuf,
}

impl RecordSource {
    pub fn new(storage: Arc<dyn StorageBackend>, path: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record in file order.
    ///
    /// Blank lines are skipped. The first malformed line, missing field or
    /// repeated key aborts the read with an input error naming the line.
    pub fn read_all(&self) -> Result<Vec<Record>> {
        let reader = BufReader::new(self.storage.open_read(&self.path)?);

        let mut records = Vec::new();
        let mut seen = HashSet::new();

        for (idx, line) in reader.split(b'\n').enumerate() {
            let line_number = idx + 1;
            let bytes = line.map_err(|e| {
                DataError::storage_with_source(
                    &self.path,
                    format!("failed to read line {line_number}"),
                    e,
                )
            })?;
            let line = String::from_utf8(bytes)
                .map_err(|_| DataError::input(line_number, "line is not valid UTF-8"))?;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let record = Record::parse_line(trimmed, line_number)?;
            if !seen.insert(record.key.clone()) {
                return Err(DataError::input(
                    line_number,
                    format!("duplicate key '{}'", record.key),
                ));
            }
            records.push(record);
        }

        tracing::debug!(
            path = %self.path.display(),
            records = records.len(),
            "read input manifest"
        );

        Ok(records)
    }
}
