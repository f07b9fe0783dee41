use std::fs;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float32Array, Int64Array, ListArray};
use arrow::buffer::OffsetBuffer;
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use vt_types::{DataError, VtError, VtResult};

use crate::dataset::CaptionExample;

pub const PIXEL_COLUMN: &str = "pixel_values";
pub const LABEL_COLUMN: &str = "labels";

// Rows per written record batch. Keeps list offsets well inside i32 even for
// full 8x3x224x224 clips.
const WRITE_CHUNK_ROWS: usize = 256;

fn pixel_item_field() -> FieldRef {
    Arc::new(Field::new("item", DataType::Float32, false))
}

fn label_item_field() -> FieldRef {
    Arc::new(Field::new("item", DataType::Int64, false))
}

/// Arrow schema of one split shard: a float list per clip, an int list per
/// tokenized caption.
pub fn split_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(PIXEL_COLUMN, DataType::List(pixel_item_field()), false),
        Field::new(LABEL_COLUMN, DataType::List(label_item_field()), false),
    ]))
}

/// Write examples to a parquet shard, replacing any existing file.
pub fn write_split_file<P: AsRef<Path>>(path: P, examples: &[CaptionExample]) -> VtResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = fs::File::create(path).map_err(|e| DataError::WriteFailed {
        message: format!("Failed to create {}: {}", path.display(), e),
    })?;

    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, split_schema(), Some(props))
        .map_err(|e| VtError::Parquet(e.to_string()))?;

    for chunk in examples.chunks(WRITE_CHUNK_ROWS) {
        let batch = examples_to_record_batch(chunk)?;
        writer
            .write(&batch)
            .map_err(|e| VtError::Parquet(e.to_string()))?;
    }

    writer
        .close()
        .map_err(|e| VtError::Parquet(e.to_string()))?;

    tracing::debug!(
        "Wrote {} examples to shard {}",
        examples.len(),
        path.display()
    );
    Ok(())
}

/// Read every example out of a parquet shard.
pub fn read_split_file<P: AsRef<Path>>(path: P) -> VtResult<Vec<CaptionExample>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DataError::LoadingFailed {
            message: format!("Split shard missing: {}", path.display()),
        }
        .into());
    }

    let file = fs::File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| DataError::LoadingFailed {
            message: format!(
                "Failed to create Parquet reader for {}: {}",
                path.display(),
                e
            ),
        })?
        .build()
        .map_err(|e| DataError::LoadingFailed {
            message: format!("Failed to build Parquet reader: {}", e),
        })?;

    let mut examples = Vec::new();
    for batch_result in reader {
        let batch = batch_result.map_err(|e| DataError::LoadingFailed {
            message: format!("Failed to read Parquet batch: {}", e),
        })?;
        examples.extend(record_batch_to_examples(&batch)?);
    }

    Ok(examples)
}

fn examples_to_record_batch(examples: &[CaptionExample]) -> VtResult<RecordBatch> {
    let mut pixel_flat = Vec::new();
    let mut pixel_lens = Vec::with_capacity(examples.len());
    let mut label_flat = Vec::new();
    let mut label_lens = Vec::with_capacity(examples.len());

    for example in examples {
        pixel_flat.extend_from_slice(&example.pixel_values);
        pixel_lens.push(example.pixel_values.len());
        label_flat.extend_from_slice(&example.labels);
        label_lens.push(example.labels.len());
    }

    let pixels = ListArray::new(
        pixel_item_field(),
        OffsetBuffer::from_lengths(pixel_lens),
        Arc::new(Float32Array::from(pixel_flat)),
        None,
    );
    let labels = ListArray::new(
        label_item_field(),
        OffsetBuffer::from_lengths(label_lens),
        Arc::new(Int64Array::from(label_flat)),
        None,
    );

    let arrays: Vec<ArrayRef> = vec![Arc::new(pixels), Arc::new(labels)];
    RecordBatch::try_new(split_schema(), arrays).map_err(|e| VtError::Arrow(e.to_string()))
}

fn record_batch_to_examples(batch: &RecordBatch) -> VtResult<Vec<CaptionExample>> {
    let pixels = batch
        .column_by_name(PIXEL_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<ListArray>())
        .ok_or_else(|| DataError::Corruption {
            message: "Invalid pixel_values column in Parquet file".to_string(),
        })?;

    let labels = batch
        .column_by_name(LABEL_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<ListArray>())
        .ok_or_else(|| DataError::Corruption {
            message: "Invalid labels column in Parquet file".to_string(),
        })?;

    let mut examples = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if pixels.is_null(i) || labels.is_null(i) {
            return Err(DataError::Corruption {
                message: format!("Null example at row {}", i),
            }
            .into());
        }

        let pixel_row = pixels.value(i);
        let pixel_row = pixel_row
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| DataError::Corruption {
                message: "pixel_values items are not float32".to_string(),
            })?;

        let label_row = labels.value(i);
        let label_row = label_row
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| DataError::Corruption {
                message: "labels items are not int64".to_string(),
            })?;

        examples.push(CaptionExample {
            pixel_values: pixel_row.values().to_vec(),
            labels: label_row.values().to_vec(),
        });
    }

    Ok(examples)
}
