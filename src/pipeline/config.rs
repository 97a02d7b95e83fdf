//! Preprocessing configuration
//!
//! Loaded from JSON when `--config` is given; CLI flags override individual
//! fields afterwards.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::encoders::{EncoderBank, DEFAULT_ALPHA, DEFAULT_PRIOR_WEIGHT};
use super::error::PipelineError;
use super::imputer::DEFAULT_MAX_PASSES;
use super::schema::AGE_LEVEL;
use super::split::{DEFAULT_HOLDOUT_FRACTION, DEFAULT_N_FOLDS, DEFAULT_SEED};

/// Which preprocessing variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Rule-based imputation, external alignment and encoders.
    #[default]
    Inference,
    /// Statistical fallback only, no encoders.
    Baseline,
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inference" => Ok(PipelineMode::Inference),
            "baseline" => Ok(PipelineMode::Baseline),
            other => Err(format!(
                "unknown mode '{}', expected 'inference' or 'baseline'",
                other
            )),
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineMode::Inference => write!(f, "inference"),
            PipelineMode::Baseline => write!(f, "baseline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Drop rows beyond three standard deviations in `outlier_columns`.
    pub remove_outliers: bool,
    /// Run the statistical fallback after rule-based imputation.
    pub fillna: bool,
    pub use_dummies: bool,
    /// Write snapshots as Parquet instead of CSV.
    pub save_as_parquet: bool,
    /// Replace placement columns with the per-user mode before fallback.
    pub fill_cat: bool,
    pub mark_categorical: bool,
    pub mode: PipelineMode,
    pub holdout_fraction: f64,
    pub n_folds: usize,
    pub seed: u64,
    pub smooth_alpha: f64,
    pub blend_alpha: f64,
    pub target_prior_weight: f64,
    pub max_passes: usize,
    pub outlier_columns: Vec<String>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            remove_outliers: false,
            fillna: true,
            use_dummies: false,
            save_as_parquet: false,
            fill_cat: false,
            mark_categorical: true,
            mode: PipelineMode::Inference,
            holdout_fraction: DEFAULT_HOLDOUT_FRACTION,
            n_folds: DEFAULT_N_FOLDS,
            seed: DEFAULT_SEED,
            smooth_alpha: DEFAULT_ALPHA,
            blend_alpha: DEFAULT_ALPHA,
            target_prior_weight: DEFAULT_PRIOR_WEIGHT,
            max_passes: DEFAULT_MAX_PASSES,
            outlier_columns: vec![AGE_LEVEL.to_string()],
        }
    }
}

impl PreprocessConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::MissingInput(path.to_path_buf()).into());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config JSON in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if !(self.holdout_fraction > 0.0 && self.holdout_fraction < 1.0) {
            return Err(PipelineError::InvalidSplit(format!(
                "holdout_fraction must be in (0, 1), got {}",
                self.holdout_fraction
            ))
            .into());
        }
        if self.n_folds < 2 {
            return Err(PipelineError::InvalidSplit(format!(
                "n_folds must be at least 2, got {}",
                self.n_folds
            ))
            .into());
        }
        anyhow::ensure!(
            self.smooth_alpha >= 0.0 && self.blend_alpha >= 0.0 && self.target_prior_weight >= 0.0,
            "smoothing weights must be non-negative"
        );
        anyhow::ensure!(self.max_passes >= 1, "max_passes must be at least 1");
        Ok(())
    }

    pub fn encoder_bank(&self) -> EncoderBank {
        EncoderBank {
            target_prior_weight: self.target_prior_weight,
            smooth_alpha: self.smooth_alpha,
            blend_alpha: self.blend_alpha,
        }
    }

    /// Snapshot file extension.
    pub fn snapshot_extension(&self) -> &'static str {
        if self.save_as_parquet {
            "parquet"
        } else {
            "csv"
        }
    }
}
