// rust/shard-core/src/writer/assignment.rs

//! Static shard layout and worker assignment.
//!
//! Both functions are pure: the layout depends only on the record count and
//! shard size, and the assignment only on the shard count and worker count.

use std::ops::Range;

/// Number of shards needed for `records` records at `per_shard` each.
pub fn shard_count(records: usize, per_shard: usize) -> usize {
    if per_shard == 0 {
        return 0;
    }
    records.div_ceil(per_shard)
}

/// Record positions belonging to shard `shard_id`.
///
/// Shard `s` holds positions `[s * per_shard, min((s + 1) * per_shard, records))`;
/// only the last shard may be short.
pub fn shard_records(shard_id: usize, per_shard: usize, records: usize) -> Range<usize> {
    let start = shard_id.saturating_mul(per_shard).min(records);
    let end = start.saturating_add(per_shard).min(records);
    start..end
}

/// Splits `total_shards` into one contiguous block per worker.
///
/// Workers with index < `total_shards % num_workers` get one extra shard.
/// Workers past the end get an empty range.
pub fn assign_blocks(total_shards: usize, num_workers: usize) -> Vec<Range<usize>> {
    if num_workers == 0 {
        return Vec::new();
    }

    let shards_per_worker = total_shards / num_workers;
    let remainder = total_shards % num_workers;

    let mut blocks = Vec::with_capacity(num_workers);
    let mut start = 0;

    for i in 0..num_workers {
        let extra = if i < remainder { 1 } else { 0 };
        let count = shards_per_worker + extra;
        blocks.push(start..start + count);
        start += count;
    }

    blocks
}
