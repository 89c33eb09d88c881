use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ParsedExample – one validated input row
// ---------------------------------------------------------------------------

/// A validated training example, ready for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedExample {
    /// Opaque record key; only used for partitioning.
    pub id: String,
    pub label: f64,
    /// Feature values in their original column order. May be empty.
    pub feat: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Bucket – the dataset partition an example belongs to
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Train,
    Validation,
    Test,
}

impl Bucket {
    /// Number of buckets; the partition count is fixed.
    pub const COUNT: usize = 3;

    /// All buckets in index order.
    pub const ALL: [Bucket; Bucket::COUNT] = [Bucket::Train, Bucket::Validation, Bucket::Test];

    /// Partition index: 0 = train, 1 = validation, 2 = test.
    pub fn index(self) -> usize {
        match self {
            Bucket::Train => 0,
            Bucket::Validation => 1,
            Bucket::Test => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Bucket::Train => "train",
            Bucket::Validation => "validation",
            Bucket::Test => "test",
        }
    }

    /// File name prefix of this bucket's output shards.
    pub fn file_prefix(self) -> &'static str {
        match self {
            Bucket::Train => "train_examples",
            Bucket::Validation => "validation_examples",
            Bucket::Test => "test_examples",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
