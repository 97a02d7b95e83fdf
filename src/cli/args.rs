//! Command-line argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::pipeline::{PipelineMode, PreprocessConfig};

/// clickprep - Clean, impute and featurise click logs for CTR modelling
#[derive(Parser, Debug)]
#[command(name = "clickprep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Training file path (CSV or Parquet)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// External test file without labels, prepared alongside the training data
    #[arg(short, long)]
    pub external: Option<PathBuf>,

    /// Output directory for snapshots and metadata.
    /// Defaults to a 'processed' directory next to the input file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON file with a PreprocessConfig. Flags below override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Preprocessing variant: "inference" (rule-based imputation and encoders)
    /// or "baseline" (statistical fallback only)
    #[arg(long)]
    pub mode: Option<PipelineMode>,

    /// Drop rows more than three standard deviations out in the outlier columns
    #[arg(long, default_value = "false")]
    pub remove_outliers: bool,

    /// Skip the statistical fallback for values rules could not infer
    #[arg(long, default_value = "false")]
    pub no_fillna: bool,

    /// One-hot encode product, campaign, webpage, category and gender
    #[arg(long, default_value = "false")]
    pub use_dummies: bool,

    /// Replace placement columns with each user's modal value
    #[arg(long, default_value = "false")]
    pub fill_cat: bool,

    /// Write snapshots as Parquet instead of CSV
    #[arg(long, default_value = "false")]
    pub parquet: bool,

    /// Number of stratified folds
    #[arg(long, value_parser = validate_folds)]
    pub folds: Option<usize>,

    /// Share of labelled rows held out as the test partition (0 to 1, exclusive)
    #[arg(long, value_parser = validate_fraction)]
    pub holdout: Option<f64>,

    /// Random seed for the holdout and fold shuffles
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of rows to use for schema inference (CSV only).
    /// Use 0 for full table scan.
    #[arg(long, default_value = "10000")]
    pub infer_schema_length: usize,

    /// Log at debug level
    #[arg(short, long, default_value = "false", conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Prepare an unlabelled file for scoring with fitted features from an earlier run
    Prepare {
        /// Input file path (CSV or Parquet)
        input: PathBuf,

        /// fitted_features.json written by a preprocessing run
        #[arg(short, long)]
        features: PathBuf,

        /// Output file path (optional, defaults to input with '_prepared' suffix).
        /// The format follows the extension.
        output: Option<PathBuf>,

        /// Preprocessing variant used when the features were fitted
        #[arg(long)]
        mode: Option<PipelineMode>,

        /// Number of rows to use for schema inference (CSV only)
        #[arg(long, default_value = "10000")]
        infer_schema_length: usize,
    },
}

impl Cli {
    /// Get the output directory, deriving from input if not explicitly provided.
    pub fn output_dir(&self) -> Option<PathBuf> {
        let input = self.input.as_ref()?;
        Some(self.output.clone().unwrap_or_else(|| {
            let parent = input.parent().unwrap_or_else(|| std::path::Path::new("."));
            parent.join("processed")
        }))
    }

    /// Apply flag overrides on top of a base configuration.
    pub fn apply_overrides(&self, mut config: PreprocessConfig) -> PreprocessConfig {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if self.remove_outliers {
            config.remove_outliers = true;
        }
        if self.no_fillna {
            config.fillna = false;
        }
        if self.use_dummies {
            config.use_dummies = true;
        }
        if self.fill_cat {
            config.fill_cat = true;
        }
        if self.parquet {
            config.save_as_parquet = true;
        }
        if let Some(folds) = self.folds {
            config.n_folds = folds;
        }
        if let Some(holdout) = self.holdout {
            config.holdout_fraction = holdout;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config
    }
}

/// Derive the prepare output path from its input.
pub fn prepared_output_path(input: &std::path::Path) -> PathBuf {
    let parent = input.parent().unwrap_or_else(|| std::path::Path::new("."));
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("csv");
    parent.join(format!("{}_prepared.{}", stem, extension))
}

/// Validator for the fold count
fn validate_folds(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid fold count", s))?;
    if value < 2 {
        Err(format!("folds must be at least 2, got {}", value))
    } else {
        Ok(value)
    }
}

/// Validator for the holdout fraction
fn validate_fraction(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(format!("holdout must be between 0 and 1 (exclusive), got {}", value))
    }
}
