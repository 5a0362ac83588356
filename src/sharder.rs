//! Deterministic subject bucketing.
//!
//! Shard indices must be identical across processes, machines and SDK implementations, so the
//! hashing scheme here is part of the wire contract and must never change.
use crate::ufc::Range;

/// Maps an input string to a shard in `[0, total_shards)`.
pub trait Sharder {
    /// Return the shard of `input`. `total_shards` must be positive.
    fn get_shard(&self, input: &str, total_shards: u64) -> u64;
}

/// The default (and only) sharder: first four bytes of the MD5 digest, big-endian, modulo
/// `total_shards`.
pub struct Md5Sharder;

impl Sharder for Md5Sharder {
    fn get_shard(&self, input: &str, total_shards: u64) -> u64 {
        let hash = md5::compute(input);
        let value = u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]);
        (value as u64) % total_shards
    }
}

/// Compute the shard of `subject_key` under `salt`.
pub fn shard_index(subject_key: &str, salt: &str, total_shards: u64) -> u64 {
    shard_index_with(&Md5Sharder, subject_key, salt, total_shards)
}

pub(crate) fn shard_index_with(
    sharder: &impl Sharder,
    subject_key: &str,
    salt: &str,
    total_shards: u64,
) -> u64 {
    sharder.get_shard(&format!("{salt}-{subject_key}"), total_shards)
}

/// Return `true` if `index` falls within any of the half-open `ranges`.
pub fn range_contains(index: u64, ranges: &[Range]) -> bool {
    ranges.iter().any(|range| range.contains(index))
}

#[cfg(test)]
pub(crate) struct DeterministicSharder(pub std::collections::HashMap<String, u64>);

#[cfg(test)]
impl Sharder for DeterministicSharder {
    fn get_shard(&self, input: &str, total_shards: u64) -> u64 {
        self.0.get(input).copied().unwrap_or(0) % total_shards
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        sharder::{range_contains, shard_index, Md5Sharder, Sharder},
        ufc::Range,
    };

    #[test]
    fn test_md5_sharder() {
        assert_eq!(Md5Sharder.get_shard("test-input", 10_000), 5619);
        assert_eq!(Md5Sharder.get_shard("alice", 10_000), 3170);
        assert_eq!(Md5Sharder.get_shard("bob", 10_000), 7420);
        assert_eq!(Md5Sharder.get_shard("charlie", 10_000), 7497);
    }

    #[test]
    fn shard_index_reference_vectors() {
        assert_eq!(shard_index("alice", "traffic-salt", 10_000), 5711);
        assert_eq!(shard_index("bob", "traffic-salt", 10_000), 9712);
        assert_eq!(shard_index("alice", "split-salt", 10_000), 9623);
        assert_eq!(shard_index("bob", "split-salt", 10_000), 4238);
        assert_eq!(shard_index("charlie", "split-salt", 10_000), 5854);
    }

    #[test]
    fn shard_index_is_stable() {
        for _ in 0..100 {
            assert_eq!(shard_index("dave", "experiment-salt", 10_000), 6672);
        }
    }

    #[test]
    fn shard_index_is_within_bounds() {
        for total_shards in [1, 2, 7, 100, 10_000] {
            for subject in ["alice", "bob", "charlie", "dave", ""] {
                assert!(shard_index(subject, "salt", total_shards) < total_shards);
            }
        }
    }

    #[test]
    fn ranges_are_half_open() {
        let ranges = [Range { start: 10, end: 20 }];
        assert!(range_contains(10, &ranges));
        assert!(range_contains(19, &ranges));
        assert!(!range_contains(20, &ranges));
        assert!(!range_contains(9, &ranges));
    }

    #[test]
    fn any_range_may_contain() {
        let ranges = [Range { start: 0, end: 5 }, Range { start: 50, end: 60 }];
        assert!(range_contains(3, &ranges));
        assert!(range_contains(55, &ranges));
        assert!(!range_contains(30, &ranges));
        assert!(!range_contains(0, &[]));
    }
}
