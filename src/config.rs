use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::data::partition::SplitWeights;
use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Output format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Gzip-compressed JSON lines.
    #[default]
    Jsonl,
    /// Parquet with GZIP column compression.
    Parquet,
}

impl OutputFormat {
    pub fn suffix(self) -> &'static str {
        match self {
            OutputFormat::Jsonl => ".gz",
            OutputFormat::Parquet => ".parquet",
        }
    }
}

// ---------------------------------------------------------------------------
// Job settings (cloud mode)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Autoscaling {
    /// Scale workers with the available hardware, up to `max_workers`.
    #[default]
    ThroughputBased,
    /// Always run exactly `num_workers`.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobSettings {
    pub job_name_prefix: String,
    pub zone: String,
    pub autoscaling: Autoscaling,
    pub max_workers: Option<usize>,
    pub num_workers: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            job_name_prefix: "example-splitter".to_string(),
            zone: "europe-west1-d".to_string(),
            autoscaling: Autoscaling::ThroughputBased,
            max_workers: None,
            num_workers: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Everything a run needs. Loaded from YAML, then overridden by CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub project_id: Option<String>,
    /// File, directory or glob pattern.
    pub input: String,
    pub output_dir: PathBuf,
    pub cloud: bool,
    pub format: OutputFormat,
    pub num_shards: usize,
    pub skip_header_lines: usize,
    pub split: SplitWeights,
    pub job: JobSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: None,
            input: "data/*".to_string(),
            output_dir: PathBuf::from("output"),
            cloud: false,
            format: OutputFormat::default(),
            num_shards: 1,
            skip_header_lines: 1,
            split: SplitWeights::default(),
            job: JobSettings::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let output = self.output_dir.to_string_lossy();
        if output.trim().is_empty() {
            return Err(ConfigError::EmptyOutputDir);
        }
        if output.contains("://") {
            return Err(ConfigError::RemoteOutputDir(output.into_owned()));
        }
        if self.num_shards == 0 {
            return Err(ConfigError::ZeroShards);
        }
        if self.split.total() == 0 {
            return Err(ConfigError::EmptySplit);
        }
        if self.cloud && self.project_id.as_deref().map_or(true, |p| p.trim().is_empty()) {
            return Err(ConfigError::MissingProjectId);
        }
        Ok(())
    }

    /// Resolve how the job runs. `now` stamps the job name to the millisecond.
    pub fn execution_mode<Tz>(&self, now: DateTime<Tz>) -> Result<ExecutionMode, ConfigError>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        if !self.cloud {
            return Ok(ExecutionMode::Local);
        }
        let project = self
            .project_id
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or(ConfigError::MissingProjectId)?;

        Ok(ExecutionMode::Distributed(JobOptions {
            job_name: format!(
                "{}-{}",
                self.job.job_name_prefix,
                now.format("%Y%m%d%H%M%S-%3f")
            ),
            project,
            zone: self.job.zone.clone(),
            staging_location: self.output_dir.join("staging"),
            temp_location: self.output_dir.join("tmp"),
            autoscaling: self.job.autoscaling,
            max_workers: self.job.max_workers,
            num_workers: self.job.num_workers,
        }))
    }
}

// ---------------------------------------------------------------------------
// Execution mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Sequential, streaming, on the calling thread.
    Local,
    /// Chunked processing on a worker pool described by the job options.
    Distributed(JobOptions),
}

/// Resolved options of a cloud run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOptions {
    pub job_name: String,
    pub project: String,
    pub zone: String,
    pub staging_location: PathBuf,
    pub temp_location: PathBuf,
    pub autoscaling: Autoscaling,
    pub max_workers: Option<usize>,
    pub num_workers: usize,
}

impl JobOptions {
    pub fn worker_count(&self) -> usize {
        let count = match self.autoscaling {
            Autoscaling::ThroughputBased => {
                let available = std::thread::available_parallelism().map_or(1, |n| n.get());
                self.max_workers.map_or(available, |max| available.min(max))
            }
            Autoscaling::None => self.num_workers,
        };
        count.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cloud_config() -> Config {
        Config {
            project_id: Some("my-project".into()),
            cloud: true,
            output_dir: PathBuf::from("/tmp/out"),
            ..Config::default()
        }
    }

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.split, SplitWeights::default());
        assert_eq!(config.skip_header_lines, 1);
    }

    #[test]
    fn yaml_overrides_defaults() {
        let config = Config::from_yaml(
            "input: raw/*.csv\nformat: parquet\nnum_shards: 4\nsplit: { train: 70, validation: 15, test: 15 }\njob:\n  autoscaling: NONE\n  num_workers: 3\n",
        )
        .unwrap();
        assert_eq!(config.input, "raw/*.csv");
        assert_eq!(config.format, OutputFormat::Parquet);
        assert_eq!(config.num_shards, 4);
        assert_eq!(config.split.train, 70);
        assert_eq!(config.job.autoscaling, Autoscaling::None);
        assert_eq!(config.job.num_workers, 3);
        assert_eq!(config.job.zone, "europe-west1-d");
        assert_eq!(config.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_yaml("outptu_dir: x\n").is_err());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut config = Config::default();
        config.num_shards = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroShards)));

        let mut config = Config::default();
        config.output_dir = PathBuf::from("gs://bucket/out");
        assert!(matches!(config.validate(), Err(ConfigError::RemoteOutputDir(_))));

        let mut config = Config::default();
        config.output_dir = PathBuf::new();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyOutputDir)));

        let mut config = Config::default();
        config.split = SplitWeights {
            train: 0,
            validation: 0,
            test: 0,
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptySplit)));

        let mut config = cloud_config();
        config.project_id = None;
        assert!(matches!(config.validate(), Err(ConfigError::MissingProjectId)));
    }

    #[test]
    fn local_mode_when_not_in_cloud() {
        let mode = Config::default().execution_mode(Utc::now()).unwrap();
        assert_eq!(mode, ExecutionMode::Local);
    }

    #[test]
    fn cloud_mode_resolves_job_options() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let ExecutionMode::Distributed(job) = cloud_config().execution_mode(now).unwrap() else {
            panic!("expected distributed mode");
        };
        assert_eq!(job.job_name, "example-splitter-20240305070809-000");
        assert_eq!(job.project, "my-project");
        assert_eq!(job.staging_location, PathBuf::from("/tmp/out/staging"));
        assert_eq!(job.temp_location, PathBuf::from("/tmp/out/tmp"));
        assert_eq!(job.autoscaling, Autoscaling::ThroughputBased);
    }

    #[test]
    fn job_names_differ_within_one_second() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let later = now + chrono::Duration::milliseconds(42);
        let name = |at| match cloud_config().execution_mode(at).unwrap() {
            ExecutionMode::Distributed(job) => job.job_name,
            ExecutionMode::Local => panic!("expected distributed mode"),
        };
        assert_eq!(name(later), "example-splitter-20240305070809-042");
        assert_ne!(name(now), name(later));
    }

    #[test]
    fn worker_count_follows_autoscaling() {
        let now = Utc::now();
        let ExecutionMode::Distributed(mut job) = cloud_config().execution_mode(now).unwrap() else {
            panic!("expected distributed mode");
        };
        job.max_workers = Some(1);
        assert_eq!(job.worker_count(), 1);

        job.autoscaling = Autoscaling::None;
        job.num_workers = 5;
        assert_eq!(job.worker_count(), 5);

        job.num_workers = 0;
        assert_eq!(job.worker_count(), 1);
    }
}
