//! Tests for stratified holdout and k-fold splitting

use std::collections::BTreeSet;

use clickprep::pipeline::*;
use polars::prelude::*;

#[path = "common/mod.rs"]
mod common;

use common::*;

fn click_labels(rows: usize, seed: u64) -> Vec<i64> {
    let df = create_click_log(rows, seed);
    df.column("is_click")
        .unwrap()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

fn rate(labels: &[i64], rows: &[usize]) -> f64 {
    rows.iter().filter(|&&i| labels[i] == 1).count() as f64 / rows.len() as f64
}

#[test]
fn test_holdout_preserves_click_rate() {
    let y = click_labels(2000, 3);
    let overall = rate(&y, &(0..y.len()).collect::<Vec<_>>());

    let split = stratified_holdout(&y, DEFAULT_HOLDOUT_FRACTION, DEFAULT_SEED).unwrap();

    assert!((rate(&y, &split.train) - overall).abs() < 0.05);
    assert!((rate(&y, &split.test) - overall).abs() < 0.05);
    let expected_test = (y.len() as f64 * DEFAULT_HOLDOUT_FRACTION).round() as i64;
    assert!((split.test.len() as i64 - expected_test).abs() <= 1);
}

#[test]
fn test_holdout_partitions_every_row_once() {
    let y = click_labels(500, 9);
    let split = stratified_holdout(&y, 0.25, 42).unwrap();

    let train: BTreeSet<usize> = split.train.iter().copied().collect();
    let test: BTreeSet<usize> = split.test.iter().copied().collect();
    assert!(train.is_disjoint(&test));
    assert_eq!(train.len() + test.len(), y.len());
    assert!(split.train.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_different_seeds_give_different_holdouts() {
    let y = click_labels(500, 9);
    let a = stratified_holdout(&y, 0.2, 1).unwrap();
    let b = stratified_holdout(&y, 0.2, 2).unwrap();
    assert_ne!(a.test, b.test);
}

#[test]
fn test_kfold_validation_sets_cover_partition() {
    let y = click_labels(1000, 5);
    let folds = stratified_kfold(&y, DEFAULT_N_FOLDS, DEFAULT_SEED).unwrap();
    assert_eq!(folds.len(), DEFAULT_N_FOLDS);

    let mut seen = BTreeSet::new();
    for fold in &folds {
        for &row in &fold.validation {
            assert!(seen.insert(row), "row {} validated twice", row);
        }
        let train: BTreeSet<usize> = fold.train.iter().copied().collect();
        assert!(fold.validation.iter().all(|row| !train.contains(row)));
    }
    assert_eq!(seen.len(), y.len());
}

#[test]
fn test_kfold_preserves_click_rate() {
    let y = click_labels(2000, 21);
    let overall = rate(&y, &(0..y.len()).collect::<Vec<_>>());

    for fold in stratified_kfold(&y, 5, 100).unwrap() {
        let r = rate(&y, &fold.validation);
        assert!(
            (r - overall).abs() < 0.05,
            "fold {} rate {:.3} vs {:.3}",
            fold.index,
            r,
            overall
        );
    }
}

#[test]
fn test_emit_folds_hands_each_fold_to_sink() {
    struct Collect(Vec<(usize, usize, usize)>);
    impl SplitSink for Collect {
        fn on_fold(&mut self, fold: &FoldData) -> anyhow::Result<()> {
            assert_eq!(fold.x_train.height(), fold.y_train.height());
            assert_eq!(fold.x_val.height(), fold.y_val.height());
            assert!(fold.x_train.column("is_click").is_err());
            self.0.push((fold.index, fold.x_train.height(), fold.x_val.height()));
            Ok(())
        }
    }

    let df = create_click_log(200, 8);
    let y: Vec<i64> = df
        .column("is_click")
        .unwrap()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .collect();
    let folds = stratified_kfold(&y, 4, 0).unwrap();

    let mut sink = Collect(Vec::new());
    emit_folds(&df, "is_click", &folds, &mut sink).unwrap();

    assert_eq!(sink.0.len(), 4);
    for (i, (index, train, val)) in sink.0.iter().enumerate() {
        assert_eq!(*index, i);
        assert_eq!(train + val, 200);
    }
}

#[test]
fn test_split_errors_are_typed() {
    let err = stratified_kfold(&[0, 1, 0], 5, 0).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::InvalidSplit(_))
    ));

    let df = df! { "a" => [1i64, 2] }.unwrap();
    let err = split_xy(&df, "is_click").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::MissingColumn(c)) if c == "is_click"
    ));
}
