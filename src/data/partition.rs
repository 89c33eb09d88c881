use serde::{Deserialize, Serialize};

use crate::metrics::Counters;

use super::model::{Bucket, ParsedExample};

// ---------------------------------------------------------------------------
// Stable hash
// ---------------------------------------------------------------------------

pub const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over raw bytes.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// MurmurHash3 64-bit finalizer. FNV-1a alone has weak low bits, and the
/// bucket is taken from `hash % total`.
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

/// Hash of a record key that is identical across runs, processes and
/// platforms: `fmix64(fnv1a_64(utf8(key)))`.
pub fn stable_hash(key: &str) -> u64 {
    fmix64(fnv1a_64(key.as_bytes()))
}

// ---------------------------------------------------------------------------
// SplitWeights – relative bucket sizes
// ---------------------------------------------------------------------------

/// Relative size of each bucket. The hash is reduced modulo the sum of the
/// weights and compared against cumulative thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitWeights {
    pub train: u32,
    pub validation: u32,
    pub test: u32,
}

impl Default for SplitWeights {
    fn default() -> Self {
        Self {
            train: 80,
            validation: 10,
            test: 10,
        }
    }
}

impl SplitWeights {
    pub fn total(&self) -> u64 {
        u64::from(self.train) + u64::from(self.validation) + u64::from(self.test)
    }

    /// Map a hash onto a bucket. `total()` must be non-zero.
    pub fn bucket_for(&self, hash: u64) -> Bucket {
        let slot = hash % self.total();
        let train = u64::from(self.train);
        let validation = train + u64::from(self.validation);
        if slot < train {
            Bucket::Train
        } else if slot < validation {
            Bucket::Validation
        } else {
            Bucket::Test
        }
    }
}

// ---------------------------------------------------------------------------
// Partitioner
// ---------------------------------------------------------------------------

/// Where an example is written: its bucket and the shard within that bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Assignment {
    pub bucket: Bucket,
    pub shard: usize,
}

/// Deterministic id-based router from examples to output files.
#[derive(Debug, Clone, Copy)]
pub struct Partitioner {
    weights: SplitWeights,
    num_shards: usize,
}

impl Partitioner {
    /// `weights.total()` and `num_shards` must be non-zero; `Config::validate`
    /// rejects both before a partitioner is built.
    pub fn new(weights: SplitWeights, num_shards: usize) -> Self {
        debug_assert!(weights.total() > 0);
        debug_assert!(num_shards > 0);
        Self {
            weights,
            num_shards,
        }
    }

    /// Pure assignment. The bucket uses the full hash, the shard uses its
    /// upper half so the two stay independent.
    pub fn assign(&self, example: &ParsedExample) -> Assignment {
        let hash = stable_hash(&example.id);
        Assignment {
            bucket: self.weights.bucket_for(hash),
            shard: ((hash >> 32) % self.num_shards as u64) as usize,
        }
    }

    /// Assign and count the example under its bucket's counter.
    pub fn partition(&self, example: &ParsedExample, counters: &Counters) -> Assignment {
        let assignment = self.assign(example);
        counters.inc_partition(assignment.bucket);
        assignment
    }
}

impl Default for Partitioner {
    fn default() -> Self {
        Self::new(SplitWeights::default(), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(id: &str) -> ParsedExample {
        ParsedExample {
            id: id.to_string(),
            label: 0.0,
            feat: Vec::new(),
        }
    }

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn stable_hash_is_pinned() {
        assert_eq!(stable_hash("42"), 0x810b_196a_56ee_3cec);
        assert_eq!(stable_hash("abc"), 0x33eb_af99_27cb_c5bd);
    }

    #[test]
    fn known_ids_land_in_pinned_buckets() {
        let partitioner = Partitioner::default();
        for (id, bucket) in [
            ("42", Bucket::Train),
            ("7", Bucket::Train),
            ("9", Bucket::Train),
            ("1", Bucket::Validation),
            ("4", Bucket::Validation),
            ("15", Bucket::Test),
            ("21", Bucket::Test),
        ] {
            assert_eq!(partitioner.assign(&example(id)).bucket, bucket, "id {id}");
        }
    }

    #[test]
    fn assignment_is_deterministic() {
        let partitioner = Partitioner::new(SplitWeights::default(), 4);
        for i in 0..1_000 {
            let ex = example(&format!("user-{i}"));
            assert_eq!(partitioner.assign(&ex), partitioner.assign(&ex.clone()));
        }
    }

    #[test]
    fn distribution_converges_to_weights() {
        let partitioner = Partitioner::default();
        let n = 50_000;
        let mut counts = [0usize; Bucket::COUNT];
        for i in 0..n {
            counts[partitioner.assign(&example(&i.to_string())).bucket.index()] += 1;
        }
        let fractions: Vec<f64> = counts.iter().map(|&c| c as f64 / n as f64).collect();
        assert!((fractions[0] - 0.8).abs() < 0.015, "{fractions:?}");
        assert!((fractions[1] - 0.1).abs() < 0.015, "{fractions:?}");
        assert!((fractions[2] - 0.1).abs() < 0.015, "{fractions:?}");
    }

    #[test]
    fn thresholds_are_cumulative() {
        let weights = SplitWeights::default();
        assert_eq!(weights.bucket_for(0), Bucket::Train);
        assert_eq!(weights.bucket_for(79), Bucket::Train);
        assert_eq!(weights.bucket_for(80), Bucket::Validation);
        assert_eq!(weights.bucket_for(89), Bucket::Validation);
        assert_eq!(weights.bucket_for(90), Bucket::Test);
        assert_eq!(weights.bucket_for(199), Bucket::Test);
    }

    #[test]
    fn zero_weight_bucket_is_never_chosen() {
        let weights = SplitWeights {
            train: 9,
            validation: 0,
            test: 1,
        };
        for hash in 0..1_000 {
            assert_ne!(weights.bucket_for(hash), Bucket::Validation);
        }
    }

    #[test]
    fn shards_stay_in_range_and_cover_all() {
        let partitioner = Partitioner::new(SplitWeights::default(), 3);
        let mut seen = [false; 3];
        for i in 0..500 {
            let shard = partitioner.assign(&example(&i.to_string())).shard;
            assert!(shard < 3);
            seen[shard] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn partition_counts_each_example_once() {
        let partitioner = Partitioner::default();
        let counters = Counters::new();
        for id in ["42", "1", "15", "21"] {
            partitioner.partition(&example(id), &counters);
        }
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.train, 1);
        assert_eq!(snapshot.validation, 1);
        assert_eq!(snapshot.test, 2);
        assert_eq!(snapshot.failed, 0);
    }
}
