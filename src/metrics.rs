//! Monitoring counters.
//!
//! Each counter is an independent monotonic accumulator. The driver owns a
//! [`Counters`] value and lends it to workers by shared reference; relaxed
//! atomic increments commute, so no lock is needed.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::data::model::Bucket;

pub const PARTITION_TRAIN: &str = "partition.train";
pub const PARTITION_VALIDATION: &str = "partition.validation";
pub const PARTITION_TEST: &str = "partition.test";
pub const BUILD_FAILED: &str = "build.failed";

#[derive(Debug, Default)]
pub struct Counters {
    partitions: [AtomicU64; Bucket::COUNT],
    failed: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_partition(&self, bucket: Bucket) {
        self.partitions[bucket.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn partition(&self, bucket: Bucket) -> u64 {
        self.partitions[bucket.index()].load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            train: self.partition(Bucket::Train),
            validation: self.partition(Bucket::Validation),
            test: self.partition(Bucket::Test),
            failed: self.failed(),
        }
    }
}

/// Point-in-time copy of [`Counters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub train: u64,
    pub validation: u64,
    pub test: u64,
    pub failed: u64,
}

impl CounterSnapshot {
    pub fn partition(&self, bucket: Bucket) -> u64 {
        match bucket {
            Bucket::Train => self.train,
            Bucket::Validation => self.validation,
            Bucket::Test => self.test,
        }
    }

    /// Examples that made it into a bucket.
    pub fn written(&self) -> u64 {
        self.train + self.validation + self.test
    }

}

impl fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PARTITION_TRAIN}={} {PARTITION_VALIDATION}={} {PARTITION_TEST}={} {BUILD_FAILED}={}",
            self.train, self.validation, self.test, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_are_independent() {
        let counters = Counters::new();
        counters.inc_partition(Bucket::Train);
        counters.inc_partition(Bucket::Train);
        counters.inc_partition(Bucket::Test);
        counters.inc_failed();

        let snapshot = counters.snapshot();
        assert_eq!(
            snapshot,
            CounterSnapshot {
                train: 2,
                validation: 0,
                test: 1,
                failed: 1,
            }
        );
        assert_eq!(snapshot.written(), 3);
        assert_eq!(snapshot.partition(Bucket::Train), 2);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let counters = Counters::new();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..1_000 {
                        counters.inc_partition(Bucket::Validation);
                        counters.inc_failed();
                    }
                });
            }
        });
        assert_eq!(counters.partition(Bucket::Validation), 8_000);
        assert_eq!(counters.failed(), 8_000);
    }

    #[test]
    fn display_uses_published_names() {
        let snapshot = CounterSnapshot {
            train: 8,
            validation: 1,
            test: 1,
            failed: 2,
        };
        assert_eq!(
            snapshot.to_string(),
            "partition.train=8 partition.validation=1 partition.test=1 build.failed=2"
        );
    }
}
