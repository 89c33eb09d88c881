/// Data layer: core types, reading, parsing, and partitioning.
///
/// Architecture:
/// ```text
///  data/*  (.csv / .csv.gz / any text)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  discover files, skip header → RawRecord
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  parser   │  "id,label,f0,f1,…" → ParsedExample | ParseError
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ partition  │  stable_hash(id) % 100 → Bucket (+ shard)
///   └───────────┘
/// ```

pub mod loader;
pub mod model;
pub mod parser;
pub mod partition;
