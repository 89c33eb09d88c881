//! Output side: per-bucket, per-shard example writers.
//!
//! Shards are written into a temp directory. [`BucketSinks::finish`] closes
//! every writer before any file is moved into the output directory, and
//! restores the files it replaced if a move fails. Dropping unfinished sinks
//! deletes their temp files.

pub mod columnar;
pub mod jsonl;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::OutputFormat;
use crate::data::model::{Bucket, ParsedExample};
use crate::data::partition::Assignment;
use crate::error::PipelineError;

use columnar::ParquetExampleWriter;
use jsonl::JsonlWriter;

/// A sink for serialized examples.
pub trait ExampleWriter {
    fn write(&mut self, example: &ParsedExample) -> Result<(), PipelineError>;

    /// Flush and close the underlying file, returning how many examples it holds.
    fn finish(self: Box<Self>) -> Result<u64, PipelineError>;
}

pub fn open_writer(path: &Path, format: OutputFormat) -> Result<Box<dyn ExampleWriter>, PipelineError> {
    Ok(match format {
        OutputFormat::Jsonl => Box::new(JsonlWriter::create(path)?),
        OutputFormat::Parquet => Box::new(ParquetExampleWriter::create(path)?),
    })
}

/// `train_examples-00000-of-00001.gz`
pub fn shard_file_name(bucket: Bucket, shard: usize, num_shards: usize, format: OutputFormat) -> String {
    format!(
        "{}-{shard:05}-of-{num_shards:05}{}",
        bucket.file_prefix(),
        format.suffix()
    )
}

/// A finished output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub bucket: Bucket,
    pub shard: usize,
    pub path: PathBuf,
    pub records: u64,
}

struct Slot {
    bucket: Bucket,
    shard: usize,
    file_name: String,
    writer: Box<dyn ExampleWriter>,
}

/// Directory under the temp dir holding output files replaced by a promotion
/// that is still in progress.
const BACKUP_DIR: &str = ".previous";

/// One open writer for every (bucket, shard) pair.
pub struct BucketSinks {
    output_dir: PathBuf,
    temp_dir: PathBuf,
    num_shards: usize,
    /// Every shard file this sink owns in `temp_dir`.
    file_names: Vec<String>,
    slots: Vec<Slot>,
}

impl BucketSinks {
    pub fn create(
        output_dir: &Path,
        temp_dir: &Path,
        format: OutputFormat,
        num_shards: usize,
    ) -> Result<Self, PipelineError> {
        fs::create_dir_all(temp_dir).map_err(|source| PipelineError::Write {
            path: temp_dir.to_path_buf(),
            source,
        })?;

        let mut file_names = Vec::with_capacity(Bucket::COUNT * num_shards);
        for bucket in Bucket::ALL {
            for shard in 0..num_shards {
                file_names.push(shard_file_name(bucket, shard, num_shards, format));
            }
        }

        // Built before any writer opens so an error below still cleans up.
        let mut sinks = Self {
            output_dir: output_dir.to_path_buf(),
            temp_dir: temp_dir.to_path_buf(),
            num_shards,
            file_names,
            slots: Vec::new(),
        };
        for (index, file_name) in sinks.file_names.iter().enumerate() {
            let writer = open_writer(&sinks.temp_dir.join(file_name), format)?;
            sinks.slots.push(Slot {
                bucket: Bucket::ALL[index / num_shards],
                shard: index % num_shards,
                file_name: file_name.clone(),
                writer,
            });
        }
        Ok(sinks)
    }

    pub fn write(&mut self, assignment: Assignment, example: &ParsedExample) -> Result<(), PipelineError> {
        let index = assignment.bucket.index() * self.num_shards + assignment.shard;
        self.slots[index].writer.write(example)
    }

    /// Close every writer, then move all files into the output directory.
    pub fn finish(mut self) -> Result<Vec<OutputFile>, PipelineError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| PipelineError::Write {
            path: self.output_dir.clone(),
            source,
        })?;

        let mut files = Vec::with_capacity(self.slots.len());
        for slot in std::mem::take(&mut self.slots) {
            let records = slot.writer.finish()?;
            files.push(OutputFile {
                bucket: slot.bucket,
                shard: slot.shard,
                path: self.output_dir.join(&slot.file_name),
                records,
            });
        }

        let backup_dir = self.temp_dir.join(BACKUP_DIR);
        let mut promoted: Vec<(PathBuf, Option<PathBuf>)> = Vec::with_capacity(files.len());
        for (file, file_name) in files.iter().zip(&self.file_names) {
            match promote(&self.temp_dir.join(file_name), &file.path, &backup_dir.join(file_name)) {
                Ok(backup) => promoted.push((file.path.clone(), backup)),
                Err(err) => {
                    roll_back(&promoted);
                    return Err(err);
                }
            }
        }

        for (_, backup) in &promoted {
            if let Some(backup) = backup {
                remove_file_if_exists(backup);
            }
        }
        for file in &files {
            debug!("Wrote {} {} example(s) to {}", file.records, file.bucket, file.path.display());
        }
        Ok(files)
    }
}

impl Drop for BucketSinks {
    fn drop(&mut self) {
        // Close any writer still open before deleting its file.
        self.slots.clear();
        for file_name in &self.file_names {
            remove_file_if_exists(&self.temp_dir.join(file_name));
        }
        remove_dir_if_empty(&self.temp_dir.join(BACKUP_DIR));
        remove_dir_if_empty(&self.temp_dir);
    }
}

/// Move `staged` to `dest`, first moving an existing `dest` to `backup`.
/// Returns the backup path when one was taken.
fn promote(staged: &Path, dest: &Path, backup: &Path) -> Result<Option<PathBuf>, PipelineError> {
    let backed_up = if dest.is_file() {
        if let Some(parent) = backup.parent() {
            fs::create_dir_all(parent).map_err(|source| PipelineError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        move_file(dest, backup)?;
        Some(backup.to_path_buf())
    } else {
        None
    };

    if let Err(err) = move_file(staged, dest) {
        if let Some(backup) = &backed_up {
            if let Err(e) = move_file(backup, dest) {
                warn!("Could not restore {}: {}", dest.display(), e);
            }
        }
        return Err(err);
    }
    Ok(backed_up)
}

/// Undo earlier promotions of this run, newest first.
fn roll_back(promoted: &[(PathBuf, Option<PathBuf>)]) {
    for (dest, backup) in promoted.iter().rev() {
        remove_file_if_exists(dest);
        if let Some(backup) = backup {
            if let Err(e) = move_file(backup, dest) {
                warn!("Could not restore {}: {}", dest.display(), e);
            }
        }
    }
}

fn move_file(from: &Path, to: &Path) -> Result<(), PipelineError> {
    fs::rename(from, to)
        .or_else(|_| fs::copy(from, to).and_then(|_| fs::remove_file(from)))
        .map_err(|source| PipelineError::Write {
            path: to.to_path_buf(),
            source,
        })
}

fn remove_file_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!("Could not remove {}: {e}", path.display()),
    }
}

/// Remove `dir` if it exists and holds nothing.
pub(crate) fn remove_dir_if_empty(dir: &Path) {
    match fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return;
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => {
            debug!("Could not inspect {}: {e}", dir.display());
            return;
        }
    }
    if let Err(e) = fs::remove_dir(dir) {
        debug!("Leaving {} in place: {e}", dir.display());
    }
}
