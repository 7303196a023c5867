//! Reading and writing Parquet and JSON files.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Serialize;
use tracing::info;

use crate::StoreError;

/// Read a Parquet file into Arrow RecordBatches.
pub fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>, StoreError> {
    if !path.exists() {
        return Err(StoreError::ParquetNotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let batches: Result<Vec<RecordBatch>, _> = reader.collect();
    let batches = batches?;
    info!(
        path = %path.display(),
        rows = batches.iter().map(|b| b.num_rows()).sum::<usize>(),
        "read parquet"
    );
    Ok(batches)
}

/// Write one batch to a new Parquet file, replacing any existing file.
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<(), StoreError> {
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    info!(path = %path.display(), rows = batch.num_rows(), "wrote parquet");
    Ok(())
}

/// Write a value as pretty-printed JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    info!(path = %path.display(), "wrote json");
    Ok(())
}
