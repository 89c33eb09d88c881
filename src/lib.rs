//! Deterministic train/validation/test splitting of delimited training data.
//!
//! Rows of the form `id,label,feat_0,...,feat_n` are parsed into
//! [`data::model::ParsedExample`]s, assigned to a [`data::model::Bucket`] by a
//! stable hash of their id, and written to compressed per-bucket files.

pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod sink;
