//! Label-stratified holdout and k-fold splitting
//!
//! Splits work on row positions. Each class is shuffled with a seeded
//! `StdRng`, so the same seed always yields the same partition. Index lists
//! returned here are sorted, which keeps every partition in original row
//! order.

use std::collections::BTreeMap;

use anyhow::Result;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use super::error::PipelineError;
use super::schema::{has_column, ROW_ID};
use super::values::take_rows;

pub const DEFAULT_HOLDOUT_FRACTION: f64 = 0.2;
pub const DEFAULT_N_FOLDS: usize = 5;
pub const DEFAULT_SEED: u64 = 100;

/// Train and held-out row positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Holdout {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// One cross-validation fold over a partition's row positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    pub index: usize,
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Row positions per class, each list shuffled with `rng`.
fn shuffled_classes(labels: &[i64], rng: &mut StdRng) -> BTreeMap<i64, Vec<usize>> {
    let mut classes: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        classes.entry(label).or_default().push(i);
    }
    for indices in classes.values_mut() {
        indices.shuffle(rng);
    }
    classes
}

/// Hold out `round(n_c · fraction)` rows of every class.
pub fn stratified_holdout(labels: &[i64], fraction: f64, seed: u64) -> Result<Holdout> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(PipelineError::InvalidSplit(format!(
            "holdout fraction must be in (0, 1), got {}",
            fraction
        ))
        .into());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    for indices in shuffled_classes(labels, &mut rng).into_values() {
        let n_test = (indices.len() as f64 * fraction).round() as usize;
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    if train.is_empty() || test.is_empty() {
        return Err(PipelineError::InvalidSplit(format!(
            "holdout of {} over {} rows leaves an empty partition",
            fraction,
            labels.len()
        ))
        .into());
    }

    train.sort_unstable();
    test.sort_unstable();
    info!(train = train.len(), test = test.len(), "stratified holdout");
    Ok(Holdout { train, test })
}

/// Stratified k folds. Each shuffled class is dealt round-robin starting
/// where the previous class stopped, so fold sizes differ by at most one.
pub fn stratified_kfold(labels: &[i64], k: usize, seed: u64) -> Result<Vec<Fold>> {
    if k < 2 {
        return Err(PipelineError::InvalidSplit(format!("need at least 2 folds, got {}", k)).into());
    }
    if k > labels.len() {
        return Err(PipelineError::InvalidSplit(format!(
            "{} folds requested for {} rows",
            k,
            labels.len()
        ))
        .into());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut validation: Vec<Vec<usize>> = vec![Vec::new(); k];
    let mut offset = 0;
    for indices in shuffled_classes(labels, &mut rng).into_values() {
        for (j, &row) in indices.iter().enumerate() {
            validation[(offset + j) % k].push(row);
        }
        offset += indices.len();
    }

    let folds: Vec<Fold> = validation
        .into_iter()
        .enumerate()
        .map(|(index, mut val)| {
            val.sort_unstable();
            let mut in_val = vec![false; labels.len()];
            for &row in &val {
                in_val[row] = true;
            }
            let train = (0..labels.len()).filter(|&row| !in_val[row]).collect();
            Fold {
                index,
                train,
                validation: val,
            }
        })
        .collect();

    debug!(
        folds = k,
        sizes = ?folds.iter().map(|f| f.validation.len()).collect::<Vec<_>>(),
        "stratified k-fold"
    );
    Ok(folds)
}

/// Features and label of one fold.
#[derive(Debug, Clone)]
pub struct FoldData {
    pub index: usize,
    pub x_train: DataFrame,
    pub y_train: DataFrame,
    pub x_val: DataFrame,
    pub y_val: DataFrame,
}

/// The final training/holdout split plus the external test set.
#[derive(Debug, Clone)]
pub struct FinalSplit {
    pub x_train: DataFrame,
    pub y_train: DataFrame,
    pub x_test: DataFrame,
    pub y_test: DataFrame,
    pub x_external: Option<DataFrame>,
}

/// Receives split products as they are produced.
pub trait SplitSink {
    fn on_fold(&mut self, fold: &FoldData) -> Result<()>;

    fn on_final(&mut self, _split: &FinalSplit) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NoopSink;

impl SplitSink for NoopSink {
    fn on_fold(&mut self, _fold: &FoldData) -> Result<()> {
        Ok(())
    }
}

/// Separate features from the label. Both halves keep `row_id` when present.
pub fn split_xy(df: &DataFrame, label: &str) -> Result<(DataFrame, DataFrame)> {
    if !has_column(df, label) {
        return Err(PipelineError::MissingColumn(label.to_string()).into());
    }
    let x = df.drop(label)?;
    let y = if has_column(df, ROW_ID) {
        df.select([ROW_ID, label])?
    } else {
        df.select([label])?
    };
    Ok((x, y))
}

/// Materialise each fold and hand it to the sink.
pub fn emit_folds(
    df: &DataFrame,
    label: &str,
    folds: &[Fold],
    sink: &mut dyn SplitSink,
) -> Result<()> {
    for fold in folds {
        let (x_train, y_train) = split_xy(&take_rows(df, &fold.train)?, label)?;
        let (x_val, y_val) = split_xy(&take_rows(df, &fold.validation)?, label)?;
        sink.on_fold(&FoldData {
            index: fold.index,
            x_train,
            y_train,
            x_val,
            y_val,
        })?;
    }
    Ok(())
}
