//! Tests for CLI argument parsing and the binary end to end

use assert_cmd::Command;
use clap::Parser;
use clickprep::cli::{prepared_output_path, Cli, Commands};
use clickprep::pipeline::{PipelineMode, PreprocessConfig};
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use polars::prelude::SerWriter;

#[path = "common/mod.rs"]
mod common;

use common::*;

#[test]
fn test_cli_default_values() {
    let cli = Cli::parse_from(["clickprep", "-i", "train.csv"]);

    assert!(cli.command.is_none());
    assert!(cli.mode.is_none(), "Mode should come from the config by default");
    assert!(!cli.remove_outliers);
    assert!(!cli.no_fillna);
    assert!(!cli.use_dummies);
    assert!(!cli.parquet);
    assert_eq!(cli.folds, None);
    assert_eq!(
        cli.infer_schema_length, 10000,
        "Default schema inference should be 10000"
    );

    let config = cli.apply_overrides(PreprocessConfig::default());
    assert_eq!(config, PreprocessConfig::default());
}

#[test]
fn test_cli_overrides_config() {
    let cli = Cli::parse_from([
        "clickprep",
        "-i",
        "train.csv",
        "--mode",
        "baseline",
        "--remove-outliers",
        "--no-fillna",
        "--use-dummies",
        "--parquet",
        "--folds",
        "3",
        "--holdout",
        "0.25",
        "--seed",
        "7",
    ]);

    let config = cli.apply_overrides(PreprocessConfig::default());
    assert_eq!(config.mode, PipelineMode::Baseline);
    assert!(config.remove_outliers);
    assert!(!config.fillna);
    assert!(config.use_dummies);
    assert!(config.save_as_parquet);
    assert_eq!(config.n_folds, 3);
    assert_eq!(config.holdout_fraction, 0.25);
    assert_eq!(config.seed, 7);
}

#[test]
fn test_cli_rejects_invalid_split_values() {
    assert!(Cli::try_parse_from(["clickprep", "-i", "a.csv", "--folds", "1"]).is_err());
    assert!(Cli::try_parse_from(["clickprep", "-i", "a.csv", "--holdout", "1.0"]).is_err());
    assert!(Cli::try_parse_from(["clickprep", "-i", "a.csv", "--holdout", "0"]).is_err());
    assert!(Cli::try_parse_from(["clickprep", "-i", "a.csv", "--mode", "fancy"]).is_err());
    assert!(Cli::try_parse_from(["clickprep", "-i", "a.csv", "-v", "-q"]).is_err());
}

#[test]
fn test_cli_output_dir_derivation() {
    let cli = Cli::parse_from(["clickprep", "-i", "/path/to/train.csv"]);
    assert_eq!(cli.output_dir().unwrap(), PathBuf::from("/path/to/processed"));

    let cli = Cli::parse_from(["clickprep", "-i", "train.csv", "-o", "out"]);
    assert_eq!(cli.output_dir().unwrap(), PathBuf::from("out"));

    let cli = Cli::parse_from(["clickprep"]);
    assert!(cli.output_dir().is_none());
}

#[test]
fn test_prepare_subcommand_parsing() {
    let cli = Cli::parse_from([
        "clickprep",
        "prepare",
        "/data/test.parquet",
        "-f",
        "fitted_features.json",
    ]);

    match cli.command {
        Some(Commands::Prepare {
            input,
            features,
            output,
            mode,
            infer_schema_length,
        }) => {
            assert_eq!(input, PathBuf::from("/data/test.parquet"));
            assert_eq!(features, PathBuf::from("fitted_features.json"));
            assert!(output.is_none());
            assert!(mode.is_none());
            assert_eq!(infer_schema_length, 10000);
            assert_eq!(
                prepared_output_path(&input),
                PathBuf::from("/data/test_prepared.parquet")
            );
        }
        None => panic!("expected the prepare subcommand"),
    }
}

fn assert_written(dir: &Path, names: &[&str]) {
    for name in names {
        assert!(dir.join(name).exists(), "{} was not written", name);
    }
}

#[test]
fn test_binary_writes_snapshots_and_metadata() {
    let mut train = create_click_log(300, 1);
    let (dir, input) = create_temp_csv(&mut train);
    let mut external = create_external_log(80, 2);
    let external_path = dir.path().join("test.csv");
    let mut file = std::fs::File::create(&external_path).unwrap();
    polars::prelude::CsvWriter::new(&mut file)
        .finish(&mut external)
        .unwrap();
    let output = dir.path().join("out");

    Command::cargo_bin("clickprep")
        .unwrap()
        .arg("-i")
        .arg(&input)
        .arg("-e")
        .arg(&external_path)
        .arg("-o")
        .arg(&output)
        .args(["--folds", "3", "-q"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Preprocessing complete!"));

    assert_written(
        &output,
        &[
            "X_train.csv",
            "y_train.csv",
            "X_test.csv",
            "y_test.csv",
            "X_test_external.csv",
            "X_train_fold_0.csv",
            "y_val_fold_2.csv",
            "cleaned_data.csv",
            "fitted_features.json",
            "run_manifest.json",
        ],
    );
    assert!(!output.join("X_train_fold_3.csv").exists());

    let manifest = std::fs::read_to_string(output.join("run_manifest.json")).unwrap();
    assert!(manifest.contains("\"rows_loaded\": 300"));

    let x_train = std::fs::read_to_string(output.join("X_train.csv")).unwrap();
    let header = x_train.lines().next().unwrap();
    assert!(!header.split(',').any(|c| c == "row_id" || c == "is_click"));
}

#[test]
fn test_binary_prepare_uses_fitted_features() {
    let mut train = create_click_log(300, 3);
    let (dir, input) = create_temp_csv(&mut train);
    let output = dir.path().join("out");

    Command::cargo_bin("clickprep")
        .unwrap()
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("-q")
        .assert()
        .success();

    let mut scoring = create_external_log(40, 4);
    let scoring_path = dir.path().join("score.csv");
    let mut file = std::fs::File::create(&scoring_path).unwrap();
    polars::prelude::CsvWriter::new(&mut file)
        .finish(&mut scoring)
        .unwrap();

    Command::cargo_bin("clickprep")
        .unwrap()
        .arg("prepare")
        .arg(&scoring_path)
        .arg("-f")
        .arg(output.join("fitted_features.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Preparation complete!"));

    let prepared = std::fs::read_to_string(dir.path().join("score_prepared.csv")).unwrap();
    assert_eq!(prepared.lines().count(), 41);
}

#[test]
fn test_binary_fails_on_missing_input() {
    Command::cargo_bin("clickprep")
        .unwrap()
        .args(["-i", "/nonexistent/train.csv", "-o", "/tmp/clickprep-never"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found").or(predicate::str::contains("/nonexistent/train.csv")));
}
