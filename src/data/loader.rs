use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::Utf8Error;

use flate2::read::MultiGzDecoder;
use log::debug;

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Input discovery
// ---------------------------------------------------------------------------

/// Resolve the configured input into a sorted list of files.
///
/// Accepted forms:
/// * a single file path
/// * a directory – every regular file directly inside it
/// * a glob pattern such as `data/*.csv`
pub fn discover_inputs(input: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let as_path = Path::new(input);
    if as_path.is_file() {
        return Ok(vec![as_path.to_path_buf()]);
    }

    let pattern = if as_path.is_dir() {
        as_path.join("*").to_string_lossy().into_owned()
    } else {
        input.to_string()
    };

    let entries = glob::glob(&pattern).map_err(|source| PipelineError::Pattern {
        pattern: pattern.clone(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PipelineError::Read {
            path: e.path().to_path_buf(),
            source: e.into_error(),
        })?;
        if path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(PipelineError::NoInput { pattern });
    }
    files.sort();
    debug!("Resolved {} input file(s) from {pattern}", files.len());
    Ok(files)
}

// ---------------------------------------------------------------------------
// Line reading
// ---------------------------------------------------------------------------

/// One line of input, with its terminator stripped. Bytes are kept raw so a
/// line that is not valid UTF-8 can be rejected on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based line number within the source file, header lines included.
    pub line_number: usize,
    pub bytes: Vec<u8>,
}

impl RawRecord {
    pub fn text(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(&self.bytes)
    }
}

/// Iterator over the data lines of one file.
pub struct RecordReader {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    skip_header_lines: usize,
    line_number: usize,
}

impl RecordReader {
    /// Next line with `\n` / `\r\n` removed, `None` at end of input.
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        if self.reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }
}

impl Iterator for RecordReader {
    type Item = Result<RawRecord, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let bytes = match self.read_line() {
                Ok(line) => line?,
                Err(source) => {
                    return Some(Err(PipelineError::Read {
                        path: self.path.clone(),
                        source,
                    }))
                }
            };
            self.line_number += 1;
            if self.line_number <= self.skip_header_lines {
                continue;
            }
            return Some(Ok(RawRecord {
                line_number: self.line_number,
                bytes,
            }));
        }
    }
}

/// Open a file for line-by-line reading, skipping its first
/// `skip_header_lines` lines. `.gz` files are decompressed on the fly.
pub fn read_records(path: &Path, skip_header_lines: usize) -> Result<RecordReader, PipelineError> {
    let file = File::open(path).map_err(|source| PipelineError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let reader: Box<dyn BufRead + Send> = if is_gzip(path) {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    Ok(RecordReader {
        path: path.to_path_buf(),
        reader,
        skip_header_lines,
        line_number: 0,
    })
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}
