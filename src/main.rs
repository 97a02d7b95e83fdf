//! clickprep: Click-Log Preprocessing CLI Tool
//!
//! Cleans an impression log, infers missing attributes, generates
//! leakage-safe encodings and writes stratified train/test/fold snapshots.

mod cli;
mod pipeline;
mod report;
mod utils;

use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use console::style;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cli::{Cli, Commands};
use pipeline::{load_dataset, loader::estimated_size_mb, PreprocessConfig, Preprocessor};
use report::{
    export_fitted_features, PreprocessSummary, RunManifest, SnapshotFormat,
    SnapshotWriter, CLEANED_DATA, FITTED_FEATURES_FILE, MANIFEST_FILE,
};
use utils::{
    create_spinner, finish_with_success, finish_with_warning, print_banner, print_completion,
    print_config, print_count, print_info, print_step_header, print_success, print_warning,
};

fn init_tracing(cli: &Cli) -> Result<()> {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    // Handle subcommands
    if let Some(command) = &cli.command {
        return match command {
            Commands::Prepare {
                input,
                features,
                output,
                mode,
                infer_schema_length,
            } => cli::prepare::run_prepare(
                input,
                features,
                output.as_deref(),
                *mode,
                *infer_schema_length,
            ),
        };
    }

    let input = cli.input.as_ref().ok_or_else(|| {
        anyhow::anyhow!("Input file is required. Use -i/--input to specify a file.")
    })?;
    let output_dir = cli
        .output_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not derive an output directory"))?;

    let base = match &cli.config {
        Some(path) => PreprocessConfig::from_json_file(path)?,
        None => PreprocessConfig::default(),
    };
    let config = cli.apply_overrides(base);
    config.validate()?;

    print_banner(env!("CARGO_PKG_VERSION"));
    print_config(input, cli.external.as_deref(), &output_dir, &config);

    let run_start = Instant::now();

    // Step 1: Load
    print_step_header(1, "Load Data");
    let spinner = create_spinner("Reading training data...");
    let train = load_dataset(input, cli.infer_schema_length)?;
    finish_with_success(&spinner, "Training data loaded");
    print_count(
        "rows",
        train.height(),
        Some(&format!(
            "({} columns, {:.2} MB)",
            train.width() - 1,
            estimated_size_mb(&train)
        )),
    );

    let external = match &cli.external {
        Some(path) => {
            let spinner = create_spinner("Reading external test data...");
            let df = load_dataset(path, cli.infer_schema_length)?;
            finish_with_success(&spinner, "External test data loaded");
            print_count("external rows", df.height(), None);
            Some(df)
        }
        None => {
            print_info("No external test file given");
            None
        }
    };

    // Step 2: Preprocess
    print_step_header(2, "Clean, Impute and Generate Features");
    let format = SnapshotFormat::from_config(&config);
    let mut writer = SnapshotWriter::new(&output_dir, format)?;
    let preprocessor = Preprocessor::new(config.clone());

    let spinner = create_spinner("Preprocessing...");
    let output = preprocessor.run(&train, external.as_ref(), &mut writer)?;
    if output.stats.remaining_nulls == 0 {
        finish_with_success(&spinner, "Preprocessing complete");
    } else {
        finish_with_warning(&spinner, "Preprocessing complete with unresolved nulls");
    }

    if let Some(report) = &output.stats.impute {
        print_count(
            "cells inferred by rules",
            report.total_fills(),
            Some(&format!("({} passes)", report.passes)),
        );
        if !report.converged {
            print_warning("Rule-based imputation hit the pass limit before converging");
        }
    }
    print_count("features generated", output.fitted.feature_names.len(), None);

    // Step 3: Save
    print_step_header(3, "Save Results");
    let spinner = create_spinner("Writing metadata...");
    writer.write(&output.cleaned, CLEANED_DATA)?;
    export_fitted_features(&output.fitted, &output_dir.join(FITTED_FEATURES_FILE))?;
    let manifest = RunManifest::new(
        input,
        cli.external.as_deref(),
        &config,
        output.stats.rows_loaded,
        output.stats.rows_cleaned,
        &output.fitted.feature_names,
        writer.written(),
    );
    manifest.export(&output_dir.join(MANIFEST_FILE))?;
    finish_with_success(
        &spinner,
        &format!("Saved {} files to {}", writer.written().len() + 2, output_dir.display()),
    );
    print_success(&format!(
        "Snapshots written as {}",
        style(format.extension()).yellow()
    ));

    PreprocessSummary::from_output(&output, run_start.elapsed()).display();
    print_completion();

    Ok(())
}
