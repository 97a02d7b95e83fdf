//! End-to-end preprocessing of a training table and an optional external
//! test table

use anyhow::Result;
use polars::prelude::*;
use tracing::{info, warn};

use super::align::{align_to_features, AlignedFrame};
use super::cleaning::{
    drop_empty_rows, drop_unidentified_rows, remove_outliers, shift_user_group,
    user_depth_from_training,
};
use super::config::{PipelineMode, PreprocessConfig};
use super::features::{FeatureGenerator, FeatureOptions, FittedFeatures};
use super::finisher::{FinishReport, MissingValueFinisher};
use super::imputer::{DeterministicImputer, ImputeReport};
use super::schema::{has_column, require_record_columns, IS_CLICK, UNLABELED};
use super::split::{
    emit_folds, split_xy, stratified_holdout, stratified_kfold, FinalSplit, SplitSink,
};
use super::values::{label_cells, take_rows};

/// Row counts and sub-reports collected during a run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub rows_loaded: usize,
    pub rows_cleaned: usize,
    pub external_rows: usize,
    pub impute: Option<ImputeReport>,
    pub outliers_removed: usize,
    pub finish: Option<FinishReport>,
    /// Nulls left in the cleaned training table.
    pub remaining_nulls: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoldSummary {
    pub index: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub validation_click_rate: f64,
}

#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    /// Training table after cleaning and imputation, before feature generation.
    pub cleaned: DataFrame,
    pub fitted: FittedFeatures,
    pub x_train: DataFrame,
    pub y_train: DataFrame,
    pub x_test: DataFrame,
    pub y_test: DataFrame,
    pub x_external: Option<DataFrame>,
    pub folds: Vec<FoldSummary>,
    pub stats: RunStats,
}

pub struct Preprocessor {
    config: PreprocessConfig,
    label: String,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self {
            config,
            label: IS_CLICK.to_string(),
        }
    }

    fn feature_generator(&self) -> FeatureGenerator {
        let options = FeatureOptions {
            use_encoders: self.config.mode == PipelineMode::Inference,
            mark_categorical: self.config.mark_categorical,
            use_dummies: self.config.use_dummies,
        };
        FeatureGenerator::new(options, self.config.encoder_bank())
    }

    fn imputer(&self) -> DeterministicImputer {
        DeterministicImputer::default().with_max_passes(self.config.max_passes)
    }

    fn finisher(&self) -> MissingValueFinisher {
        MissingValueFinisher::default().with_fill_cat(self.config.fill_cat)
    }

    /// Clean, impute, split and featurise. Folds and final partitions are
    /// handed to `sink` as they are produced.
    pub fn run(
        &self,
        train: &DataFrame,
        external: Option<&DataFrame>,
        sink: &mut dyn SplitSink,
    ) -> Result<PreprocessOutput> {
        self.config.validate()?;
        require_record_columns(train, Some(self.label.as_str()))?;
        if let Some(df) = external {
            require_record_columns(df, None)?;
        }
        let inference = self.config.mode == PipelineMode::Inference;
        let mut stats = RunStats {
            rows_loaded: train.height(),
            ..Default::default()
        };
        info!(mode = %self.config.mode, rows = train.height(), "preprocessing started");

        let mut train = drop_unidentified_rows(&drop_empty_rows(train)?, &self.label)?;

        let mut external = match external {
            Some(df) => {
                let mut df = with_label(drop_empty_rows(df)?, &self.label)?;
                if inference {
                    df = shift_user_group(&df, 1)?;
                    df = user_depth_from_training(&train, &df)?;
                }
                Some(df)
            }
            None => None,
        };

        if inference {
            let imputer = self.imputer();
            let (filled, report) = imputer.run(&train)?;
            train = filled;
            stats.impute = Some(report);
            if let Some(df) = external.as_mut() {
                *df = imputer.run(df)?.0;
            }
        }

        if self.config.remove_outliers {
            let (kept, removed) = remove_outliers(&train, &self.config.outlier_columns)?;
            train = kept;
            stats.outliers_removed = removed;
            if let Some(df) = external.as_mut() {
                *df = remove_outliers(df, &self.config.outlier_columns)?.0;
            }
        }

        if self.config.fillna {
            let finisher = self.finisher();
            let (finished, report) = finisher.finish(&train, true)?;
            train = finished;
            stats.finish = Some(report);
            if let Some(df) = external.as_mut() {
                *df = finisher.finish(df, false)?.0;
            }
        }

        stats.rows_cleaned = train.height();
        stats.remaining_nulls = train.get_columns().iter().map(|c| c.null_count()).sum();
        if stats.remaining_nulls > 0 {
            warn!(nulls = stats.remaining_nulls, "cleaned training table still has nulls");
        }
        let cleaned = train;

        let labels: Vec<i64> = label_cells(&cleaned, &self.label)?
            .into_iter()
            .map(|l| l.unwrap_or(UNLABELED))
            .collect();
        let holdout = stratified_holdout(&labels, self.config.holdout_fraction, self.config.seed)?;
        let subset = take_rows(&cleaned, &holdout.train)?;
        let validation = take_rows(&cleaned, &holdout.test)?;

        let generator = self.feature_generator();
        let (train_features, fitted) = generator.fit_transform(&subset)?;
        let test_features = generator.transform(&validation, &fitted)?;
        let x_external = match &external {
            Some(df) => {
                let features = generator.transform(df, &fitted)?;
                stats.external_rows = features.height();
                Some(features.drop(&self.label)?)
            }
            None => None,
        };

        let fold_labels: Vec<i64> = label_cells(&train_features, &self.label)?
            .into_iter()
            .map(|l| l.unwrap_or(UNLABELED))
            .collect();
        let folds = stratified_kfold(&fold_labels, self.config.n_folds, self.config.seed)?;
        emit_folds(&train_features, &self.label, &folds, sink)?;

        let fold_summaries: Vec<FoldSummary> = folds
            .iter()
            .map(|fold| {
                let clicks = fold.validation.iter().filter(|&&i| fold_labels[i] == 1).count();
                FoldSummary {
                    index: fold.index,
                    train_rows: fold.train.len(),
                    validation_rows: fold.validation.len(),
                    validation_click_rate: clicks as f64 / fold.validation.len().max(1) as f64,
                }
            })
            .collect();

        let (x_train, y_train) = split_xy(&train_features, &self.label)?;
        let (x_test, y_test) = split_xy(&test_features, &self.label)?;
        let split = FinalSplit {
            x_train,
            y_train,
            x_test,
            y_test,
            x_external,
        };
        sink.on_final(&split)?;

        info!(
            train = split.x_train.height(),
            test = split.x_test.height(),
            folds = fold_summaries.len(),
            features = fitted.feature_names.len(),
            "preprocessing finished"
        );

        Ok(PreprocessOutput {
            cleaned,
            fitted,
            x_train: split.x_train,
            y_train: split.y_train,
            x_test: split.x_test,
            y_test: split.y_test,
            x_external: split.x_external,
            folds: fold_summaries,
            stats,
        })
    }

    /// Prepare an unseen table for scoring with previously fitted state and
    /// lay it out in training feature order.
    pub fn prepare_external(&self, df: &DataFrame, fitted: &FittedFeatures) -> Result<AlignedFrame> {
        let mut df = with_label(drop_empty_rows(df)?, &self.label)?;
        if self.config.mode == PipelineMode::Inference {
            df = shift_user_group(&df, 1)?;
            df = self.imputer().run(&df)?.0;
        }
        if self.config.fillna {
            df = self.finisher().finish(&df, false)?.0;
        }

        let features = self.feature_generator().derive(&df, fitted)?;
        let aligned = align_to_features(&features, &fitted.feature_names, &fitted.categorical)?;
        if !aligned.missing.is_empty() {
            warn!(missing = ?aligned.missing, "input lacks features the model was trained on");
        }
        info!(rows = aligned.frame.height(), "prepared table for scoring");
        Ok(aligned)
    }
}

/// External tables may lack the label; mark every row as unlabelled.
fn with_label(mut df: DataFrame, label: &str) -> Result<DataFrame> {
    if !has_column(&df, label) {
        let unknown = vec![UNLABELED; df.height()];
        df.with_column(Column::new(label.into(), unknown))?;
    }
    Ok(df)
}
