//! Sharder implementation.
//!
//! Bucketing must agree with every other client evaluating the same toggles, so the hash
//! function and the identifier layout are fixed: MurmurHash3 (x86, 32-bit, seed 0) over the UTF-8
//! bytes of the identifier, reduced modulo the normalizer.
use std::io::Cursor;

/// Normalizer used by rollout percentages.
pub const ROLLOUT_NORMALIZER: u32 = 100;

const MURMUR3_SEED: u32 = 0;

pub trait Sharder {
    /// Map `input` to a shard in `[0, total_shards)`. `total_shards` must be non-zero.
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u32) -> u32;
}

/// The default (and only) sharder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Murmur3Sharder;

impl Sharder for Murmur3Sharder {
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u32) -> u32 {
        let hash = murmur3::murmur3_32(&mut Cursor::new(input.as_ref()), MURMUR3_SEED)
            .expect("reading from an in-memory buffer cannot fail");
        hash % total_shards
    }
}

/// Bucket in `[0, 100)` for a rollout identified by `group_id`.
///
/// The hashed string is `"{group_id}:{identifier}"`. An empty identifier is valid.
pub fn bucket(sharder: &impl Sharder, identifier: &str, group_id: &str) -> u32 {
    sharder.get_shard(format!("{group_id}:{identifier}"), ROLLOUT_NORMALIZER)
}

#[cfg(test)]
pub(crate) struct DeterministicSharder(pub std::collections::HashMap<String, u32>);

#[cfg(test)]
impl Sharder for DeterministicSharder {
    fn get_shard(&self, input: impl AsRef<[u8]>, total_shards: u32) -> u32 {
        let input = String::from_utf8_lossy(input.as_ref());
        self.0.get(input.as_ref()).copied().unwrap_or(0) % total_shards
    }
}

#[cfg(test)]
mod tests {
    use super::{bucket, Murmur3Sharder, Sharder};

    #[test]
    fn test_murmur3_reference_values() {
        assert_eq!(Murmur3Sharder.get_shard("", u32::MAX), 0);
        assert_eq!(Murmur3Sharder.get_shard("hello", u32::MAX), 613_153_351);
        assert_eq!(Murmur3Sharder.get_shard("test", u32::MAX), 3_127_628_307);
    }

    #[test]
    fn test_rollout_buckets() {
        assert_eq!(bucket(&Murmur3Sharder, "user-1", "groupA"), 4);
        assert_eq!(bucket(&Murmur3Sharder, "user-2", "groupA"), 58);
        assert_eq!(bucket(&Murmur3Sharder, "user-3", "groupA"), 81);
    }

    #[test]
    fn empty_identifier_has_stable_bucket() {
        assert_eq!(bucket(&Murmur3Sharder, "", "groupA"), 79);
        assert_eq!(
            bucket(&Murmur3Sharder, "", "groupA"),
            bucket(&Murmur3Sharder, "", "groupA")
        );
    }

    #[test]
    fn buckets_are_below_normalizer() {
        for i in 0..1_000 {
            assert!(bucket(&Murmur3Sharder, &i.to_string(), "range") < 100);
        }
    }
}
