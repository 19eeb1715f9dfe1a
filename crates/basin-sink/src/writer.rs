//! Atomic table writing: Parquet via ArrowWriter, or TSV.
//!
//! Every write lands in a temp file next to the final path and is renamed
//! into place, so readers never observe a partial artifact and cancelled
//! runs leave nothing behind. A failed write is retried once with a fresh
//! temp file, then surfaced as fatal.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, BooleanArray, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use basin_common::{BasinError, BasinResult};

/// Output serialization for all artifacts of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Parquet,
    Tsv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Tsv => "tsv",
        }
    }
}

fn io_err(context: &str, e: impl std::fmt::Display) -> BasinError {
    BasinError::Io {
        source: std::io::Error::new(std::io::ErrorKind::Other, format!("{context}: {e}")),
    }
}

fn tmp_path(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".into());
    path.with_file_name(format!(".{name}{suffix}"))
}

/// Write all batches to `path` atomically, retrying once on failure.
pub fn write_table_atomic(
    path: &Path,
    schema: &Arc<Schema>,
    batches: &[RecordBatch],
    format: OutputFormat,
) -> BasinResult<()> {
    match write_once(path, schema, batches, format, ".tmp") {
        Ok(()) => Ok(()),
        Err(first) => {
            tracing::warn!(
                path = %path.display(),
                error = %first,
                "artifact write failed; retrying with a fresh temp file"
            );
            write_once(path, schema, batches, format, ".tmp-retry")
        }
    }
}

fn write_once(
    path: &Path,
    schema: &Arc<Schema>,
    batches: &[RecordBatch],
    format: OutputFormat,
    suffix: &str,
) -> BasinResult<()> {
    let tmp = tmp_path(path, suffix);
    let result = match format {
        OutputFormat::Parquet => write_parquet(&tmp, schema, batches),
        OutputFormat::Tsv => write_tsv(&tmp, schema, batches),
    };
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn write_parquet(tmp: &Path, schema: &Arc<Schema>, batches: &[RecordBatch]) -> BasinResult<()> {
    let file = File::create(tmp)?;
    let mut writer = ArrowWriter::try_new(file, Arc::clone(schema), None)
        .map_err(|e| io_err("cannot create Parquet writer", e))?;
    for batch in batches {
        writer
            .write(batch)
            .map_err(|e| io_err("Parquet write", e))?;
    }
    writer.close().map_err(|e| io_err("Parquet close", e))?;
    Ok(())
}

fn write_tsv(tmp: &Path, schema: &Arc<Schema>, batches: &[RecordBatch]) -> BasinResult<()> {
    let file = File::create(tmp)?;
    let mut out = BufWriter::new(file);

    let header: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    writeln!(out, "{}", header.join("\t"))?;

    for batch in batches {
        for row in 0..batch.num_rows() {
            let mut cells = Vec::with_capacity(batch.num_columns());
            for (col, field) in batch.columns().iter().zip(schema.fields()) {
                cells.push(tsv_cell(col.as_ref(), field.data_type(), row)?);
            }
            writeln!(out, "{}", cells.join("\t"))?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Render one cell; nulls become empty fields.
fn tsv_cell(array: &dyn Array, data_type: &DataType, row: usize) -> BasinResult<String> {
    if array.is_null(row) {
        return Ok(String::new());
    }
    let cell = match data_type {
        DataType::Int32 => downcast::<Int32Array>(array)?.value(row).to_string(),
        DataType::Int64 => downcast::<Int64Array>(array)?.value(row).to_string(),
        DataType::Float64 => downcast::<Float64Array>(array)?.value(row).to_string(),
        DataType::Boolean => downcast::<BooleanArray>(array)?.value(row).to_string(),
        DataType::Utf8 => downcast::<StringArray>(array)?.value(row).to_string(),
        other => {
            return Err(BasinError::Internal(format!(
                "unsupported TSV column type {other}"
            )))
        }
    };
    Ok(cell)
}

fn downcast<T: 'static>(array: &dyn Array) -> BasinResult<&T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| BasinError::Internal("column type mismatch during write".into()))
}
