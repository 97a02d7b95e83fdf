//! Dataset loader for CSV and Parquet files

use anyhow::{Context, Result};
use polars::prelude::*;
use std::path::Path;
use tracing::info;

use super::cleaning::attach_row_id;
use super::error::PipelineError;

/// Rows sampled for CSV schema inference when the caller has no preference.
pub const DEFAULT_INFER_SCHEMA_LENGTH: usize = 10_000;

/// Load a dataset from a file (CSV or Parquet based on extension)
pub fn load_lazy(path: &Path, infer_schema_length: usize) -> Result<LazyFrame> {
    if !path.exists() {
        return Err(PipelineError::MissingInput(path.to_path_buf()).into());
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    // 0 means scan the whole file
    let schema_length = if infer_schema_length == 0 {
        None
    } else {
        Some(infer_schema_length)
    };

    let lf = match extension.as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_infer_schema_length(schema_length)
            .finish()
            .with_context(|| format!("Failed to load CSV file: {}", path.display()))?,
        "parquet" => LazyFrame::scan_parquet(path, Default::default())
            .with_context(|| format!("Failed to load Parquet file: {}", path.display()))?,
        _ => anyhow::bail!(
            "Unsupported file format: {}. Supported formats: csv, parquet",
            extension
        ),
    };

    Ok(lf)
}

/// Load a dataset into memory with a `row_id` column holding each row's
/// original position.
pub fn load_dataset(path: &Path, infer_schema_length: usize) -> Result<DataFrame> {
    let df = load_lazy(path, infer_schema_length)?
        .collect()
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let df = attach_row_id(df)?;

    let (rows, cols) = df.shape();
    info!(path = %path.display(), rows, columns = cols - 1, "loaded dataset");
    Ok(df)
}

/// Estimated in-memory size in megabytes.
pub fn estimated_size_mb(df: &DataFrame) -> f64 {
    df.estimated_size() as f64 / (1024.0 * 1024.0)
}
