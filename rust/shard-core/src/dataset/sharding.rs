// rust/shard-core/src/dataset/sharding.rs

//! Pure partition and shuffle functions used by the datapipe.
//!
//! Nothing here depends on the rank doing the calling except
//! [`is_assigned`]; every rank derives the same permutations from the same
//! seed, which is what keeps the partition disjoint without coordination.

use std::hash::Hasher;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use twox_hash::XxHash64;

/// Seed for the list-level shuffle of `epoch`.
pub fn epoch_seed(seed: u64, epoch: u32) -> u64 {
    let mut hasher = XxHash64::with_seed(seed);
    hasher.write(b"epoch");
    hasher.write(&epoch.to_le_bytes());
    hasher.finish()
}

/// Seed for the in-shard shuffle of the shard at `position` in the epoch's
/// shard list.
pub fn shard_seed(seed: u64, epoch: u32, position: usize) -> u64 {
    let mut hasher = XxHash64::with_seed(seed);
    hasher.write(b"shard");
    hasher.write(&epoch.to_le_bytes());
    hasher.write(&(position as u64).to_le_bytes());
    hasher.finish()
}

/// Seed handed to the feature pipeline for one record.
pub fn record_seed(seed: u64, epoch: u32, position: usize, record: usize) -> u64 {
    let mut hasher = XxHash64::with_seed(shard_seed(seed, epoch, position));
    hasher.write(&(record as u64).to_le_bytes());
    hasher.finish()
}

/// Returns `0..len` permuted by a generator seeded with `seed`.
pub fn shuffled_order(len: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    order
}

/// Round-robin ownership: position `p` belongs to rank `p % world_size`.
pub fn is_assigned(position: usize, rank: usize, world_size: usize) -> bool {
    world_size > 0 && position % world_size == rank
}

/// Positions in `0..len` owned by `rank`.
pub fn assigned_positions(len: usize, rank: usize, world_size: usize) -> Vec<usize> {
    if world_size == 0 || rank >= world_size {
        return Vec::new();
    }
    (rank..len).step_by(world_size).collect()
}
