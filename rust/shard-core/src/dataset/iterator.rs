// rust/shard-core/src/dataset/iterator.rs

use crate::audio::Waveform;
use crate::error::{DataError, Result};
use crate::manifest::ShardPair;
use crate::shard::{RecordPayload, ShardReader};

use super::sharding::{record_seed, shard_seed, shuffled_order};
use super::traits::Sample;
use super::Datapipe;

/// Where the iterator is between two calls to `next`.
enum State {
    /// Compute the shard list for `epoch`.
    NextEpoch,
    /// Open the shard at `cursor` of the current epoch's list.
    OpenShard,
    /// Yield records of an open shard in `order`.
    ReadRecord {
        reader: ShardReader,
        order: Vec<usize>,
        next: usize,
    },
    Done,
}

/// Lazy iterator over the samples assigned to one rank.
///
/// Files are opened one shard at a time and released when the shard is
/// exhausted or the iterator is dropped. After an error is yielded the
/// iterator returns `None`.
pub struct SampleIter<'a> {
    pipe: &'a Datapipe,
    epoch: u32,
    /// Shards of the current epoch, paired with their position in the
    /// rank-independent list.
    shards: Vec<(usize, ShardPair)>,
    cursor: usize,
    state: State,
}

impl<'a> SampleIter<'a> {
    pub(super) fn new(pipe: &'a Datapipe) -> Self {
        Self {
            pipe,
            epoch: 0,
            shards: Vec::new(),
            cursor: 0,
            state: State::NextEpoch,
        }
    }

    /// Epoch currently being replayed (0-based).
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    fn fail(&mut self, err: DataError) -> Option<Result<Sample>> {
        self.state = State::Done;
        Some(Err(err))
    }

    fn open_shard(&self) -> Result<(ShardReader, Vec<usize>)> {
        let (position, pair) = &self.shards[self.cursor];
        let reader = ShardReader::open(self.pipe.storage(), &pair.idx, &pair.bin)?;

        let config = self.pipe.config();
        let order = if config.dataset_shuffling {
            shuffled_order(reader.len(), shard_seed(config.seed, self.epoch, *position))
        } else {
            (0..reader.len()).collect()
        };

        tracing::debug!(
            rank = self.pipe.rank(),
            epoch = self.epoch,
            shard = %pair.idx.display(),
            records = reader.len(),
            "opened shard"
        );
        Ok((reader, order))
    }

    fn to_sample(&self, payload: RecordPayload, record: usize) -> Result<Sample> {
        let waveform = match payload.audio {
            Some(audio) => Waveform {
                samples: audio.samples,
                sample_rate: payload.sample_rate,
                channels: audio.channels,
            },
            None => self
                .pipe
                .decoder()
                .decode(&payload.wav, payload.sample_rate)
                .map_err(|e| e.with_key(&payload.key))?,
        };

        let sample = Sample {
            key: payload.key,
            wav: payload.wav,
            txt: payload.txt,
            waveform,
            metadata: payload.metadata,
        };

        match self.pipe.pipeline() {
            Some(pipeline) if self.pipe.augment_options().is_enabled() => {
                let config = self.pipe.config();
                let (position, _) = &self.shards[self.cursor];
                let seed = record_seed(config.seed, self.epoch, *position, record);
                pipeline.process(sample, self.pipe.augment_options(), seed)
            }
            _ => Ok(sample),
        }
    }
}

impl Iterator for SampleIter<'_> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::Done => return None,

                State::NextEpoch => {
                    if self.epoch >= self.pipe.config().datalist_epoch {
                        return None;
                    }
                    self.shards = self.pipe.assigned_shards(self.epoch);
                    self.cursor = 0;
                    self.state = State::OpenShard;
                }

                State::OpenShard => {
                    if self.cursor >= self.shards.len() {
                        self.epoch += 1;
                        self.state = State::NextEpoch;
                        continue;
                    }
                    match self.open_shard() {
                        Ok((reader, order)) => {
                            self.state = State::ReadRecord {
                                reader,
                                order,
                                next: 0,
                            };
                        }
                        Err(e) => return self.fail(e),
                    }
                }

                State::ReadRecord {
                    mut reader,
                    order,
                    next,
                } => {
                    let Some(&record) = order.get(next) else {
                        self.cursor += 1;
                        self.state = State::OpenShard;
                        continue;
                    };

                    let result = reader
                        .read(record)
                        .and_then(|payload| self.to_sample(payload, record));

                    self.state = State::ReadRecord {
                        reader,
                        order,
                        next: next + 1,
                    };

                    match result {
                        Ok(sample) => return Some(Ok(sample)),
                        Err(e) if !self.pipe.config().strict && is_record_error(&e) => {
                            tracing::warn!(
                                rank = self.pipe.rank(),
                                epoch = self.epoch,
                                record,
                                error = %e,
                                "skipping unreadable record"
                            );
                        }
                        Err(e) => return self.fail(e),
                    }
                }
            }
        }
    }
}

/// Errors confined to a single record, as opposed to the shard or storage.
fn is_record_error(err: &DataError) -> bool {
    matches!(
        err,
        DataError::Format { .. } | DataError::Serialization { .. } | DataError::Decode { .. }
    )
}

impl std::iter::FusedIterator for SampleIter<'_> {}
