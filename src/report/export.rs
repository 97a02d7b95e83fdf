//! Snapshot and metadata export
//!
//! Every partition the pipeline produces is written as `<name>.csv` or
//! `<name>.parquet` in the output directory, without the internal `row_id`
//! column. Fitted feature state and a manifest of the run are written as JSON.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pipeline::schema::{has_column, ROW_ID};
use crate::pipeline::{FinalSplit, FittedFeatures, FoldData, PreprocessConfig, SplitSink};

pub const FITTED_FEATURES_FILE: &str = "fitted_features.json";
pub const MANIFEST_FILE: &str = "run_manifest.json";
pub const CLEANED_DATA: &str = "cleaned_data";
pub const EXTERNAL_TEST: &str = "X_test_external";

/// Snapshot file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    Csv,
    Parquet,
}

impl SnapshotFormat {
    pub fn from_config(config: &PreprocessConfig) -> Self {
        if config.save_as_parquet {
            SnapshotFormat::Parquet
        } else {
            SnapshotFormat::Csv
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Csv => "csv",
            SnapshotFormat::Parquet => "parquet",
        }
    }
}

/// Write `df` to `<dir>/<name>.<ext>` without the `row_id` column.
pub fn write_snapshot(
    df: &DataFrame,
    dir: &Path,
    name: &str,
    format: SnapshotFormat,
) -> Result<PathBuf> {
    let path = dir.join(format!("{}.{}", name, format.extension()));
    let mut out = if has_column(df, ROW_ID) {
        df.drop(ROW_ID)?
    } else {
        df.clone()
    };

    let file = File::create(&path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    match format {
        SnapshotFormat::Csv => {
            let mut file = file;
            CsvWriter::new(&mut file)
                .finish(&mut out)
                .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;
        }
        SnapshotFormat::Parquet => {
            ParquetWriter::new(file)
                .finish(&mut out)
                .with_context(|| format!("Failed to write Parquet file: {}", path.display()))?;
        }
    }

    debug!(path = %path.display(), rows = out.height(), "wrote snapshot");
    Ok(path)
}

/// [`SplitSink`] that persists every fold and the final split.
#[derive(Debug)]
pub struct SnapshotWriter {
    dir: PathBuf,
    format: SnapshotFormat,
    written: Vec<PathBuf>,
}

impl SnapshotWriter {
    pub fn new(dir: &Path, format: SnapshotFormat) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            format,
            written: Vec::new(),
        })
    }

    /// Files written so far, in order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn write(&mut self, df: &DataFrame, name: &str) -> Result<()> {
        let path = write_snapshot(df, &self.dir, name, self.format)?;
        self.written.push(path);
        Ok(())
    }
}

impl SplitSink for SnapshotWriter {
    fn on_fold(&mut self, fold: &FoldData) -> Result<()> {
        let i = fold.index;
        self.write(&fold.x_train, &format!("X_train_fold_{}", i))?;
        self.write(&fold.y_train, &format!("y_train_fold_{}", i))?;
        self.write(&fold.x_val, &format!("X_val_fold_{}", i))?;
        self.write(&fold.y_val, &format!("y_val_fold_{}", i))
    }

    fn on_final(&mut self, split: &FinalSplit) -> Result<()> {
        self.write(&split.x_train, "X_train")?;
        self.write(&split.y_train, "y_train")?;
        self.write(&split.x_test, "X_test")?;
        self.write(&split.y_test, "y_test")?;
        if let Some(external) = &split.x_external {
            self.write(external, EXTERNAL_TEST)?;
        }
        Ok(())
    }
}

/// Export fitted feature state to JSON
pub fn export_fitted_features(fitted: &FittedFeatures, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(fitted)
        .context("Failed to serialize fitted features to JSON")?;
    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write fitted features to {}", output_path.display()))?;
    Ok(())
}

pub fn load_fitted_features(path: &Path) -> Result<FittedFeatures> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fitted features from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid fitted features JSON in {}", path.display()))
}

/// Record of one preprocessing run
#[derive(Debug, Serialize, Deserialize)]
pub struct RunManifest {
    /// ISO 8601 timestamp
    pub timestamp: String,
    pub version: String,
    pub input_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_file: Option<String>,
    pub config: PreprocessConfig,
    pub rows_loaded: usize,
    pub rows_cleaned: usize,
    pub features: Vec<String>,
    pub files: Vec<String>,
}

impl RunManifest {
    pub fn new(
        input: &Path,
        external: Option<&Path>,
        config: &PreprocessConfig,
        rows_loaded: usize,
        rows_cleaned: usize,
        features: &[String],
        files: &[PathBuf],
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            input_file: input.display().to_string(),
            external_file: external.map(|p| p.display().to_string()),
            config: config.clone(),
            rows_loaded,
            rows_cleaned,
            features: features.to_vec(),
            files: files
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect(),
        }
    }

    pub fn export(&self, output_path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize run manifest to JSON")?;
        std::fs::write(output_path, json)
            .with_context(|| format!("Failed to write run manifest to {}", output_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fold() -> FoldData {
        let frame = df! { "row_id" => [0u32, 1], "a" => [1i64, 2] }.unwrap();
        let label = df! { "row_id" => [0u32, 1], "is_click" => [0i64, 1] }.unwrap();
        FoldData {
            index: 3,
            x_train: frame.clone(),
            y_train: label.clone(),
            x_val: frame,
            y_val: label,
        }
    }

    #[test]
    fn test_fold_snapshots_strip_row_id() {
        let dir = TempDir::new().unwrap();
        let mut writer = SnapshotWriter::new(dir.path(), SnapshotFormat::Csv).unwrap();
        writer.on_fold(&fold()).unwrap();

        assert_eq!(writer.written().len(), 4);
        let x = std::fs::read_to_string(dir.path().join("X_train_fold_3.csv")).unwrap();
        assert_eq!(x.lines().next(), Some("a"));
        assert!(dir.path().join("y_val_fold_3.csv").exists());
    }

    #[test]
    fn test_parquet_snapshot() {
        let dir = TempDir::new().unwrap();
        let df = df! { "a" => [1.5f64, 2.5] }.unwrap();
        let path = write_snapshot(&df, dir.path(), "X_test", SnapshotFormat::Parquet).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("parquet"));

        let back = LazyFrame::scan_parquet(&path, Default::default())
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(back.height(), 2);
    }
}
