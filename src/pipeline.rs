//! Job driver: input files → parser → partitioner → bucket sinks.

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{debug, error, info};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{Config, ExecutionMode, JobOptions, OutputFormat};
use crate::data::loader::{self, RawRecord};
use crate::data::model::{Bucket, ParsedExample};
use crate::data::parser::parse_line;
use crate::data::partition::{Assignment, Partitioner, SplitWeights};
use crate::error::{display_chain, ParseError, PipelineError};
use crate::metrics::{CounterSnapshot, Counters};
use crate::sink::{remove_dir_if_empty, BucketSinks, OutputFile};

/// Records handed to the worker pool at a time in distributed mode.
pub const CHUNK_SIZE: usize = 8192;

/// Directory under `output_dir` holding in-progress shards in local mode.
pub const LOCAL_TEMP_DIR: &str = ".tmp";

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct Summary {
    pub counters: CounterSnapshot,
    pub files: Vec<OutputFile>,
    /// Set when the job ran in distributed mode.
    pub job_name: Option<String>,
}

/// Run the whole job described by `config`.
pub fn run(config: &Config) -> Result<Summary, PipelineError> {
    config.validate()?;
    let mode = config.execution_mode(Local::now())?;
    let inputs = loader::discover_inputs(&config.input)?;
    let partitioner = Partitioner::new(config.split, config.num_shards);
    let counters = Counters::new();

    let (temp_dir, job) = match &mode {
        ExecutionMode::Local => {
            info!("Running locally over {} input file(s)", inputs.len());
            (config.output_dir.join(LOCAL_TEMP_DIR), None)
        }
        ExecutionMode::Distributed(job) => {
            info!(
                "Running job {} for project {} over {} input file(s) with {} worker(s)",
                job.job_name,
                job.project,
                inputs.len(),
                job.worker_count()
            );
            stage_job(job, config)?;
            (job.temp_location.join(&job.job_name), Some(job))
        }
    };

    let written = write_outputs(config, &inputs, &temp_dir, job, &partitioner, &counters);
    if let Some(job) = job {
        // Left in place if other jobs still have shards there.
        remove_dir_if_empty(&job.temp_location);
    }
    let files = written?;
    let counters = counters.snapshot();
    for bucket in Bucket::ALL {
        info!(
            "{bucket}: {} example(s) in {} shard(s)",
            counters.partition(bucket),
            config.num_shards
        );
    }
    info!("Finished: wrote {} example(s), {counters}", counters.written());

    Ok(Summary {
        counters,
        files,
        job_name: job.map(|j| j.job_name.clone()),
    })
}

/// Stream every input through the sinks. On error the sinks are dropped,
/// which deletes their temp files and leaves the output directory untouched.
fn write_outputs(
    config: &Config,
    inputs: &[PathBuf],
    temp_dir: &Path,
    job: Option<&JobOptions>,
    partitioner: &Partitioner,
    counters: &Counters,
) -> Result<Vec<OutputFile>, PipelineError> {
    let mut sinks = BucketSinks::create(&config.output_dir, temp_dir, config.format, config.num_shards)?;

    match job {
        None => {
            for path in inputs {
                process_file_sequential(path, config.skip_header_lines, partitioner, counters, &mut sinks)?;
            }
        }
        Some(job) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(job.worker_count())
                .thread_name(|i| format!("splitter-worker-{i}"))
                .build()?;
            for path in inputs {
                process_file_parallel(
                    &pool,
                    path,
                    config.skip_header_lines,
                    partitioner,
                    counters,
                    &mut sinks,
                )?;
            }
        }
    }

    sinks.finish()
}

// ---------------------------------------------------------------------------
// Per-record stages
// ---------------------------------------------------------------------------

/// Decode and parse a raw record, counting and logging it under
/// `build.failed` when it is malformed.
pub fn build_example(record: &RawRecord, path: &Path, counters: &Counters) -> Option<ParsedExample> {
    let parsed = record
        .text()
        .map_err(|source| ParseError::InvalidEncoding { source })
        .and_then(parse_line);
    match parsed {
        Ok(example) => Some(example),
        Err(err) => {
            counters.inc_failed();
            error!(
                "{}:{}: dropping record {:?}: {}",
                path.display(),
                record.line_number,
                String::from_utf8_lossy(&record.bytes),
                display_chain(&err)
            );
            None
        }
    }
}

fn route(
    record: &RawRecord,
    path: &Path,
    partitioner: &Partitioner,
    counters: &Counters,
) -> Option<(Assignment, ParsedExample)> {
    let example = build_example(record, path, counters)?;
    Some((partitioner.partition(&example, counters), example))
}

// ---------------------------------------------------------------------------
// Execution modes
// ---------------------------------------------------------------------------

fn process_file_sequential(
    path: &Path,
    skip_header_lines: usize,
    partitioner: &Partitioner,
    counters: &Counters,
    sinks: &mut BucketSinks,
) -> Result<(), PipelineError> {
    debug!("Reading {}", path.display());
    for record in loader::read_records(path, skip_header_lines)? {
        if let Some((assignment, example)) = route(&record?, path, partitioner, counters) {
            sinks.write(assignment, &example)?;
        }
    }
    Ok(())
}

/// Chunks are parsed and partitioned on the pool; writes stay on the calling
/// thread in input order.
fn process_file_parallel(
    pool: &rayon::ThreadPool,
    path: &Path,
    skip_header_lines: usize,
    partitioner: &Partitioner,
    counters: &Counters,
    sinks: &mut BucketSinks,
) -> Result<(), PipelineError> {
    debug!("Reading {}", path.display());
    let mut records = loader::read_records(path, skip_header_lines)?;
    let mut chunk: Vec<RawRecord> = Vec::with_capacity(CHUNK_SIZE);

    loop {
        chunk.clear();
        for record in records.by_ref().take(CHUNK_SIZE) {
            chunk.push(record?);
        }
        if chunk.is_empty() {
            return Ok(());
        }

        let routed: Vec<(Assignment, ParsedExample)> = pool.install(|| {
            chunk
                .par_iter()
                .filter_map(|record| route(record, path, partitioner, counters))
                .collect()
        });
        for (assignment, example) in &routed {
            sinks.write(*assignment, example)?;
        }
    }
}

// ---------------------------------------------------------------------------
// Job staging
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct JobManifest<'a> {
    options: &'a JobOptions,
    input: &'a str,
    output_dir: &'a Path,
    format: OutputFormat,
    num_shards: usize,
    skip_header_lines: usize,
    split: SplitWeights,
}

/// Write the resolved job description to `staging_location/{job_name}.json`.
/// Fails with [`PipelineError::JobExists`] rather than overwrite another job's manifest.
pub fn stage_job(job: &JobOptions, config: &Config) -> Result<PathBuf, PipelineError> {
    fs::create_dir_all(&job.staging_location).map_err(|source| PipelineError::Write {
        path: job.staging_location.clone(),
        source,
    })?;

    let path = job.staging_location.join(format!("{}.json", job.job_name));
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|source| match source.kind() {
            io::ErrorKind::AlreadyExists => PipelineError::JobExists {
                job_name: job.job_name.clone(),
                path: path.clone(),
            },
            _ => PipelineError::Write {
                path: path.clone(),
                source,
            },
        })?;
    let manifest = JobManifest {
        options: job,
        input: &config.input,
        output_dir: &config.output_dir,
        format: config.format,
        num_shards: config.num_shards,
        skip_header_lines: config.skip_header_lines,
        split: config.split,
    };
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &manifest).map_err(|source| PipelineError::Encode {
        path: path.clone(),
        source,
    })?;
    writer.flush().map_err(|source| PipelineError::Write {
        path: path.clone(),
        source,
    })?;

    debug!("Staged job manifest at {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn record(text: &str) -> RawRecord {
        RawRecord {
            line_number: 2,
            bytes: text.as_bytes().to_vec(),
        }
    }

    #[test]
    fn valid_record_is_built_without_counting_failure() {
        let counters = Counters::new();
        let example = build_example(&record("42,1.0,3.5,2.1"), Path::new("in.csv"), &counters).unwrap();
        assert_eq!(example.feat, vec![3.5, 2.1]);
        assert_eq!(counters.failed(), 0);
    }

    #[test]
    fn malformed_record_is_dropped_and_counted_once() {
        let counters = Counters::new();
        assert!(build_example(&record("7,abc,1.0"), Path::new("in.csv"), &counters).is_none());
        assert_eq!(counters.failed(), 1);
        assert_eq!(counters.snapshot().written(), 0);
    }

    #[test]
    fn route_counts_the_assigned_bucket() {
        let counters = Counters::new();
        let partitioner = Partitioner::default();
        let (assignment, example) =
            route(&record("1,0.0"), Path::new("in.csv"), &partitioner, &counters).unwrap();
        assert_eq!(example.id, "1");
        assert_eq!(assignment.bucket, Bucket::Validation);
        assert_eq!(counters.partition(Bucket::Validation), 1);
    }

    #[test]
    fn undecodable_record_is_dropped_and_counted() {
        let counters = Counters::new();
        let record = RawRecord {
            line_number: 3,
            bytes: b"\xff\xfe,1.0".to_vec(),
        };
        assert!(build_example(&record, Path::new("in.csv"), &counters).is_none());
        assert_eq!(counters.failed(), 1);
    }

    #[test]
    fn staging_the_same_job_twice_fails() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            project_id: Some("my-project".into()),
            output_dir: dir.path().join("out"),
            cloud: true,
            ..Config::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let ExecutionMode::Distributed(job) = config.execution_mode(now).unwrap() else {
            panic!("expected distributed mode");
        };

        let path = stage_job(&job, &config).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        assert!(matches!(
            stage_job(&job, &config),
            Err(PipelineError::JobExists { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }
}
