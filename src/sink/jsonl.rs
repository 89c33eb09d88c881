use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::data::model::ParsedExample;
use crate::error::PipelineError;

use super::ExampleWriter;

/// Gzip-compressed JSON lines, one `{"id":..,"label":..,"feat":[..]}` per line.
///
/// Non-finite floats have no JSON representation and are written as `null`.
pub struct JsonlWriter {
    path: PathBuf,
    encoder: GzEncoder<BufWriter<File>>,
    written: u64,
}

impl JsonlWriter {
    pub fn create(path: &Path) -> Result<Self, PipelineError> {
        let file = File::create(path).map_err(|source| PipelineError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            encoder: GzEncoder::new(BufWriter::new(file), Compression::default()),
            written: 0,
        })
    }

    fn io_error(&self, source: std::io::Error) -> PipelineError {
        PipelineError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl ExampleWriter for JsonlWriter {
    fn write(&mut self, example: &ParsedExample) -> Result<(), PipelineError> {
        serde_json::to_writer(&mut self.encoder, example).map_err(|source| PipelineError::Encode {
            path: self.path.clone(),
            source,
        })?;
        self.encoder
            .write_all(b"\n")
            .map_err(|source| self.io_error(source))?;
        self.written += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<u64, PipelineError> {
        let JsonlWriter {
            path,
            encoder,
            written,
        } = *self;
        let buffered = encoder.finish().map_err(|source| PipelineError::Write {
            path: path.clone(),
            source,
        })?;
        buffered.into_inner().map_err(|e| PipelineError::Write {
            path,
            source: e.into_error(),
        })?;
        Ok(written)
    }
}
