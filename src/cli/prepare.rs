//! Scoring-time preparation of an unlabelled file

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use crate::pipeline::{load_dataset, PipelineMode, PreprocessConfig, Preprocessor};
use crate::report::{load_fitted_features, write_snapshot, SnapshotFormat};
use crate::utils::{create_spinner, print_warning};

use super::args::prepared_output_path;

/// Run the prepare subcommand: load the file and the fitted state, derive
/// features and write them in training order.
pub fn run_prepare(
    input: &Path,
    features: &Path,
    output: Option<&Path>,
    mode: Option<PipelineMode>,
    infer_schema_length: usize,
) -> Result<()> {
    let output_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| prepared_output_path(input));
    let format = match output_path.extension().and_then(|e| e.to_str()) {
        Some("parquet") => SnapshotFormat::Parquet,
        Some("csv") | None => SnapshotFormat::Csv,
        Some(other) => anyhow::bail!(
            "Unsupported output format: {}. Supported formats: csv, parquet",
            other
        ),
    };

    println!(
        "\n {} Preparing file for scoring",
        style("◆").cyan().bold()
    );
    println!("   Input:    {}", style(input.display()).dim());
    println!("   Features: {}", style(features.display()).dim());
    println!("   Output:   {}", style(output_path.display()).dim());
    println!();

    let spinner = create_spinner("Loading data...");
    let df = load_dataset(input, infer_schema_length)?;
    let fitted = load_fitted_features(features)?;
    spinner.finish_with_message(format!(
        "{} Loaded {} rows, {} trained features",
        style("✓").green(),
        df.height(),
        fitted.feature_names.len()
    ));

    let config = PreprocessConfig {
        mode: mode.unwrap_or_default(),
        ..PreprocessConfig::default()
    };
    let spinner = create_spinner("Deriving features...");
    let aligned = Preprocessor::new(config).prepare_external(&df, &fitted)?;
    spinner.finish_with_message(format!("{} Features aligned", style("✓").green()));

    for feature in &aligned.missing {
        print_warning(&format!("Missing feature filled with placeholder: {}", feature));
    }

    let dir = output_path.parent().unwrap_or_else(|| Path::new("."));
    let stem = output_path
        .file_stem()
        .and_then(|s| s.to_str())
        .context("Output path has no file name")?;
    write_snapshot(&aligned.frame, dir, stem, format)?;

    println!();
    println!(
        "   {} rows × {} columns ({} categorical)",
        style(aligned.frame.height()).yellow(),
        style(aligned.frame.width()).yellow(),
        style(aligned.cat_indices.len()).yellow()
    );
    println!();
    println!(" {} Preparation complete!", style("✓").green().bold());

    Ok(())
}
