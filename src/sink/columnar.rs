use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Builder, ListBuilder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel};
use parquet::file::properties::WriterProperties;

use crate::data::model::ParsedExample;
use crate::error::PipelineError;

use super::ExampleWriter;

/// Rows buffered before a record batch is handed to the parquet writer.
pub const BATCH_SIZE: usize = 1024;

/// Arrow schema of a serialized example:
/// - `id`: Utf8
/// - `label`: Float64
/// - `feat`: List<Float64>
pub fn example_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("label", DataType::Float64, false),
        Field::new(
            "feat",
            DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
            false,
        ),
    ]))
}

/// Parquet output with GZIP-compressed column chunks.
pub struct ParquetExampleWriter {
    path: PathBuf,
    schema: SchemaRef,
    writer: ArrowWriter<File>,
    ids: StringBuilder,
    labels: Float64Builder,
    feats: ListBuilder<Float64Builder>,
    pending: usize,
    written: u64,
}

impl ParquetExampleWriter {
    pub fn create(path: &Path) -> Result<Self, PipelineError> {
        let file = File::create(path).map_err(|source| PipelineError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        let props = WriterProperties::builder()
            .set_compression(Compression::GZIP(GzipLevel::default()))
            .build();
        let schema = example_schema();
        let writer = ArrowWriter::try_new(file, schema.clone(), Some(props)).map_err(|source| {
            PipelineError::Parquet {
                path: path.to_path_buf(),
                source,
            }
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            schema,
            writer,
            ids: StringBuilder::new(),
            labels: Float64Builder::new(),
            feats: ListBuilder::new(Float64Builder::new()),
            pending: 0,
            written: 0,
        })
    }

    fn flush_pending(&mut self) -> Result<(), PipelineError> {
        if self.pending == 0 {
            return Ok(());
        }
        let columns: Vec<ArrayRef> = vec![
            Arc::new(self.ids.finish()),
            Arc::new(self.labels.finish()),
            Arc::new(self.feats.finish()),
        ];
        let batch = RecordBatch::try_new(self.schema.clone(), columns)?;
        self.writer
            .write(&batch)
            .map_err(|source| PipelineError::Parquet {
                path: self.path.clone(),
                source,
            })?;
        self.pending = 0;
        Ok(())
    }
}

impl ExampleWriter for ParquetExampleWriter {
    fn write(&mut self, example: &ParsedExample) -> Result<(), PipelineError> {
        self.ids.append_value(&example.id);
        self.labels.append_value(example.label);
        self.feats.values().append_slice(&example.feat);
        self.feats.append(true);
        self.pending += 1;
        self.written += 1;

        if self.pending >= BATCH_SIZE {
            self.flush_pending()?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64, PipelineError> {
        self.flush_pending()?;
        let ParquetExampleWriter {
            path,
            writer,
            written,
            ..
        } = *self;
        writer
            .close()
            .map_err(|source| PipelineError::Parquet { path, source })?;
        Ok(written)
    }
}
