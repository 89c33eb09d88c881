use std::error::Error as StdError;
use std::io;
use std::num::ParseFloatError;
use std::path::PathBuf;
use std::str::Utf8Error;

use thiserror::Error;

// ---------------------------------------------------------------------------
// ParseError – a single malformed row; recovered by the caller
// ---------------------------------------------------------------------------

/// Why a raw line could not be turned into an example.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line is not valid UTF-8")]
    InvalidEncoding { source: Utf8Error },

    #[error("expected at least 2 fields (id, label), found {found}")]
    TooFewFields { found: usize },

    #[error("label {value:?} is not a number")]
    InvalidLabel {
        value: String,
        source: ParseFloatError,
    },

    #[error("feature {index} ({value:?}) is not a number")]
    InvalidFeature {
        index: usize,
        value: String,
        source: ParseFloatError,
    },
}

// ---------------------------------------------------------------------------
// ConfigError – fatal, raised before any output is written
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}")]
    ReadFile { path: PathBuf, source: io::Error },

    #[error("failed to parse configuration file {path}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("output directory cannot be empty")]
    EmptyOutputDir,

    #[error("remote output location {0} is not supported, use a local directory")]
    RemoteOutputDir(String),

    #[error("a project id is required to run in the cloud")]
    MissingProjectId,

    #[error("number of shards must be at least 1")]
    ZeroShards,

    #[error("split weights must not all be zero")]
    EmptySplit,
}

// ---------------------------------------------------------------------------
// PipelineError – anything that aborts the job
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("invalid input pattern {pattern:?}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("no input files match {pattern:?}")]
    NoInput { pattern: String },

    #[error("failed to read {path}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {path}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to encode example for {path}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write parquet file {path}")]
    Parquet {
        path: PathBuf,
        source: parquet::errors::ParquetError,
    },

    #[error("failed to assemble record batch")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("job {job_name} is already staged at {path}")]
    JobExists { job_name: String, path: PathBuf },

    #[error("failed to start worker pool")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Render an error followed by each of its sources, `outer: inner: root`.
pub fn display_chain(err: &dyn StdError) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        current = cause.source();
    }
    out
}
