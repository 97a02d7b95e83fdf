//! Leakage-safe target and click-through-rate encoders
//!
//! Every encoder is fit on the training partition only and produces an
//! immutable [`EncoderState`]. Held-out partitions are encoded by passing that
//! state to `transform`; transforming never reads the label, so nothing about
//! a held-out partition can influence any fitted statistic.
//!
//! With `g` the click rate over rows whose label is a valid 0/1 outcome:
//!
//! - target encoding: `(sum(v) + m·g) / (n(v) + m)`
//! - smoothed CTR: `(clicks(v) + α·g) / (views(v) + α)`
//! - blended CTR: `w·clicks(v)/views(v) + (1 − w)·g` with `w = views(v) / (views(v) + α)`
//!
//! Categories unseen at fit time, and null cells, receive `g`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use anyhow::{bail, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::PipelineError;
use super::schema::has_column;
use super::values::{is_valid_label, label_cells, string_cells};

pub const DEFAULT_PRIOR_WEIGHT: f64 = 1.0;
pub const DEFAULT_ALPHA: f64 = 10.0;

/// Which statistic an encoder computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    Target,
    SmoothedCtr,
    BlendedCtr,
}

impl EncoderKind {
    /// Suffix of the feature column this encoder adds.
    pub fn suffix(&self) -> &'static str {
        match self {
            EncoderKind::Target => "te",
            EncoderKind::SmoothedCtr => "smooth",
            EncoderKind::BlendedCtr => "blend",
        }
    }

    pub fn output_name(&self, column: &str) -> String {
        format!("{}_{}", column, self.suffix())
    }

    /// Statistic for a category with `clicks` positives out of `views` rows.
    ///
    /// `weight` is the prior weight `m` for target encoding and `α` for the
    /// two CTR kinds.
    pub fn statistic(&self, clicks: f64, views: f64, global_rate: f64, weight: f64) -> f64 {
        match self {
            EncoderKind::Target | EncoderKind::SmoothedCtr => {
                let denom = views + weight;
                if denom <= 0.0 {
                    global_rate
                } else {
                    (clicks + weight * global_rate) / denom
                }
            }
            EncoderKind::BlendedCtr => {
                if views <= 0.0 {
                    return global_rate;
                }
                let w = views / (views + weight);
                let local = clicks / views;
                w * local + (1.0 - w) * global_rate
            }
        }
    }
}

impl fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncoderKind::Target => "target",
            EncoderKind::SmoothedCtr => "smoothed CTR",
            EncoderKind::BlendedCtr => "blended CTR",
        };
        write!(f, "{}", name)
    }
}

/// Fitted mapping for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnEncoding {
    pub mapping: BTreeMap<String, f64>,
    pub fallback: f64,
}

impl ColumnEncoding {
    pub fn encode(&self, value: Option<&str>) -> f64 {
        value
            .and_then(|v| self.mapping.get(v).copied())
            .unwrap_or(self.fallback)
    }
}

/// Frozen statistics of one encoder kind, produced by [`Encoder::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderState {
    pub kind: EncoderKind,
    pub weight: f64,
    pub global_rate: f64,
    /// Number of labelled rows the state was fit on.
    pub n_fit_rows: usize,
    pub columns: BTreeMap<String, ColumnEncoding>,
}

impl EncoderState {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    /// Encoded values for a column's cells.
    pub fn encode_cells(&self, column: &str, cells: &[Option<String>]) -> Result<Vec<f64>> {
        let encoding = self.columns.get(column).ok_or_else(|| PipelineError::EncoderNotFit {
            kind: self.kind,
            column: column.to_string(),
        })?;
        Ok(cells.iter().map(|c| encoding.encode(c.as_deref())).collect())
    }

    /// Append `{col}_{suffix}` for every fitted column.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let columns = self.column_names();
        self.transform_columns(df, &columns)
    }

    /// Like [`transform`](Self::transform) but skips fitted columns the table
    /// does not have.
    pub fn transform_present(&self, df: &DataFrame) -> Result<DataFrame> {
        let columns: Vec<String> = self
            .columns
            .keys()
            .filter(|c| has_column(df, c))
            .cloned()
            .collect();
        self.transform_columns(df, &columns)
    }

    /// Append encodings for the requested columns only.
    pub fn transform_columns(&self, df: &DataFrame, columns: &[String]) -> Result<DataFrame> {
        let mut out = df.clone();
        for column in columns {
            let cells = string_cells(df, column)?;
            let encoded = self.encode_cells(column, &cells)?;
            out.with_column(Column::new(self.kind.output_name(column).into(), encoded))?;
        }
        debug!(kind = %self.kind, columns = columns.len(), rows = df.height(), "applied encoder");
        Ok(out)
    }
}

/// Unfitted encoder configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Encoder {
    pub kind: EncoderKind,
    pub weight: f64,
}

impl Encoder {
    pub fn target(prior_weight: f64) -> Self {
        Self {
            kind: EncoderKind::Target,
            weight: prior_weight,
        }
    }

    pub fn smoothed_ctr(alpha: f64) -> Self {
        Self {
            kind: EncoderKind::SmoothedCtr,
            weight: alpha,
        }
    }

    pub fn blended_ctr(alpha: f64) -> Self {
        Self {
            kind: EncoderKind::BlendedCtr,
            weight: alpha,
        }
    }

    /// Fit per-column statistics from rows with a valid 0/1 label.
    pub fn fit(&self, df: &DataFrame, columns: &[String], label: &str) -> Result<EncoderState> {
        if !has_column(df, label) {
            return Err(PipelineError::MissingColumn(label.to_string()).into());
        }
        let labels = label_cells(df, label)?;
        let valid: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| is_valid_label(**l))
            .map(|(i, _)| i)
            .collect();
        if valid.is_empty() {
            bail!("cannot fit {} encoder: no rows with a 0/1 '{}' label", self.kind, label);
        }

        let clicks_total: f64 = valid.iter().filter_map(|&i| labels[i]).sum::<i64>() as f64;
        let global_rate = clicks_total / valid.len() as f64;

        let mut fitted = BTreeMap::new();
        for column in columns {
            let cells = string_cells(df, column)?;
            let mut tallies: HashMap<&str, (f64, f64)> = HashMap::new();
            for &i in &valid {
                if let (Some(value), Some(y)) = (cells[i].as_deref(), labels[i]) {
                    let entry = tallies.entry(value).or_insert((0.0, 0.0));
                    entry.0 += y as f64;
                    entry.1 += 1.0;
                }
            }
            let mapping = tallies
                .into_iter()
                .map(|(value, (clicks, views))| {
                    (
                        value.to_string(),
                        self.kind.statistic(clicks, views, global_rate, self.weight),
                    )
                })
                .collect();
            fitted.insert(
                column.clone(),
                ColumnEncoding {
                    mapping,
                    fallback: global_rate,
                },
            );
        }

        info!(
            kind = %self.kind,
            columns = fitted.len(),
            rows = valid.len(),
            global_rate,
            "fitted encoder"
        );

        Ok(EncoderState {
            kind: self.kind,
            weight: self.weight,
            global_rate,
            n_fit_rows: valid.len(),
            columns: fitted,
        })
    }
}

/// The three fitted encoders used by feature generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedEncoders {
    pub target: EncoderState,
    pub smoothed: EncoderState,
    pub blended: EncoderState,
}

impl FittedEncoders {
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let df = self.target.transform(df)?;
        let df = self.smoothed.transform(&df)?;
        self.blended.transform(&df)
    }

    pub fn transform_present(&self, df: &DataFrame) -> Result<DataFrame> {
        let df = self.target.transform_present(df)?;
        let df = self.smoothed.transform_present(&df)?;
        self.blended.transform_present(&df)
    }
}

/// Encoder parameters shared by the three kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderBank {
    pub target_prior_weight: f64,
    pub smooth_alpha: f64,
    pub blend_alpha: f64,
}

impl Default for EncoderBank {
    fn default() -> Self {
        Self {
            target_prior_weight: DEFAULT_PRIOR_WEIGHT,
            smooth_alpha: DEFAULT_ALPHA,
            blend_alpha: DEFAULT_ALPHA,
        }
    }
}

impl EncoderBank {
    pub fn fit(
        &self,
        df: &DataFrame,
        target_columns: &[String],
        ctr_columns: &[String],
        label: &str,
    ) -> Result<FittedEncoders> {
        Ok(FittedEncoders {
            target: Encoder::target(self.target_prior_weight).fit(df, target_columns, label)?,
            smoothed: Encoder::smoothed_ctr(self.smooth_alpha).fit(df, ctr_columns, label)?,
            blended: Encoder::blended_ctr(self.blend_alpha).fit(df, ctr_columns, label)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::schema::UNLABELED;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Category "a" has 2 clicks in 2 views; the 10 rows overall give g = 0.3.
    fn ctr_fixture() -> DataFrame {
        df! {
            "product" => ["a", "a", "b", "b", "b", "b", "b", "b", "b", "b"],
            "is_click" => [1i64, 1, 1, 0, 0, 0, 0, 0, 0, 0],
        }
        .unwrap()
    }

    fn encoded(df: &DataFrame, name: &str) -> Vec<f64> {
        df.column(name).unwrap().f64().unwrap().into_no_null_iter().collect()
    }

    #[test]
    fn test_smoothed_ctr_scenario() {
        let state = Encoder::smoothed_ctr(10.0)
            .fit(&ctr_fixture(), &cols(&["product"]), "is_click")
            .unwrap();
        assert!((state.global_rate - 0.3).abs() < 1e-12);
        let a = state.columns["product"].mapping["a"];
        assert!((a - 5.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_blended_ctr_matches_smoothed_only_at_equal_alpha() {
        let df = ctr_fixture();
        let blended = Encoder::blended_ctr(10.0).fit(&df, &cols(&["product"]), "is_click").unwrap();
        assert!((blended.columns["product"].mapping["a"] - 5.0 / 12.0).abs() < 1e-12);

        // alpha = 2: w = 0.5, blended = 0.5 * 1.0 + 0.5 * 0.3
        let blended = Encoder::blended_ctr(2.0).fit(&df, &cols(&["product"]), "is_click").unwrap();
        assert!((blended.columns["product"].mapping["a"] - 0.65).abs() < 1e-12);

        // alpha = 4 smoothed: (2 + 1.2) / 6
        let smoothed = Encoder::smoothed_ctr(4.0).fit(&df, &cols(&["product"]), "is_click").unwrap();
        assert!((smoothed.columns["product"].mapping["a"] - 3.2 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_target_encoding_prior_weight() {
        let df = ctr_fixture();
        let raw = Encoder::target(0.0).fit(&df, &cols(&["product"]), "is_click").unwrap();
        assert!((raw.columns["product"].mapping["b"] - 0.125).abs() < 1e-12);

        let shrunk = Encoder::target(1.0).fit(&df, &cols(&["product"]), "is_click").unwrap();
        assert!((shrunk.columns["product"].mapping["b"] - (1.0 + 0.3) / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_labels_are_ignored() {
        let df = df! {
            "product" => [Some("a"), Some("a"), Some("a"), None],
            "is_click" => [Some(1i64), Some(-1), None, Some(0)],
        }
        .unwrap();
        let state = Encoder::target(0.0).fit(&df, &cols(&["product"]), "is_click").unwrap();
        assert_eq!(state.n_fit_rows, 2);
        assert!((state.global_rate - 0.5).abs() < 1e-12);
        assert_eq!(state.columns["product"].mapping["a"], 1.0);
    }

    #[test]
    fn test_transform_fit_partition_reproduces_mapping() {
        let df = ctr_fixture();
        let state = Encoder::smoothed_ctr(10.0).fit(&df, &cols(&["product"]), "is_click").unwrap();
        let out = state.transform(&df).unwrap();
        let values = encoded(&out, "product_smooth");
        let mapping = &state.columns["product"].mapping;
        assert_eq!(values[0], mapping["a"]);
        assert_eq!(values[9], mapping["b"]);
    }

    #[test]
    fn test_unseen_and_null_get_global_rate() {
        let state = Encoder::blended_ctr(10.0)
            .fit(&ctr_fixture(), &cols(&["product"]), "is_click")
            .unwrap();
        let test = df! { "product" => [Some("zzz"), None] }.unwrap();
        let out = state.transform(&test).unwrap();
        assert_eq!(encoded(&out, "product_blend"), vec![0.3, 0.3]);
    }

    #[test]
    fn test_held_out_labels_do_not_leak() {
        let train = ctr_fixture();
        let fitted = EncoderBank::default()
            .fit(&train, &cols(&["product"]), &cols(&["product"]), "is_click")
            .unwrap();

        let held_out = df! {
            "product" => ["a", "b", "c"],
            "is_click" => [0i64, 0, 0],
        }
        .unwrap();
        let flipped = df! {
            "product" => ["a", "b", "c"],
            "is_click" => [1i64, 1, 1],
        }
        .unwrap();

        let a = fitted.transform(&held_out).unwrap();
        let b = fitted.transform(&flipped).unwrap();
        for name in ["product_te", "product_smooth", "product_blend"] {
            assert_eq!(encoded(&a, name), encoded(&b, name));
        }
    }

    #[test]
    fn test_unlabelled_rows_in_fit_table_are_invisible() {
        // Ten labelled rows followed by three unlabelled ones.
        let with_unlabelled = |products: [Option<&str>; 3], labels: [Option<i64>; 3]| {
            let mut product: Vec<Option<&str>> = ["a", "a", "b", "b", "b", "b", "b", "b", "b", "b"]
                .into_iter()
                .map(Some)
                .collect();
            product.extend(products);
            let mut label: Vec<Option<i64>> = [1i64, 1, 1, 0, 0, 0, 0, 0, 0, 0]
                .into_iter()
                .map(Some)
                .collect();
            label.extend(labels);
            df! { "product" => product, "is_click" => label }.unwrap()
        };
        let bank = EncoderBank::default();
        let fit = |df: &DataFrame| {
            bank.fit(df, &cols(&["product"]), &cols(&["product"]), "is_click")
                .unwrap()
        };

        let sentinel = fit(&with_unlabelled(
            [Some("a"), Some("b"), Some("c")],
            [Some(UNLABELED); 3],
        ));
        let perturbed = fit(&with_unlabelled(
            [Some("c"), None, Some("a")],
            [None, Some(UNLABELED), None],
        ));

        assert_eq!(sentinel, perturbed);
        assert_eq!(sentinel, fit(&ctr_fixture()));
        assert!(!sentinel.target.columns["product"].mapping.contains_key("c"));
    }

    #[test]
    fn test_transform_unfitted_column_is_usage_error() {
        let state = Encoder::target(1.0)
            .fit(&ctr_fixture(), &cols(&["product"]), "is_click")
            .unwrap();
        let df = df! { "product" => ["a"], "gender" => ["M"] }.unwrap();
        let err = state.transform_columns(&df, &cols(&["gender"])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::EncoderNotFit { kind: EncoderKind::Target, column }) if column == "gender"
        ));
    }

    #[test]
    fn test_fit_without_label_fails_fast() {
        let df = df! { "product" => ["a"] }.unwrap();
        let err = Encoder::target(1.0).fit(&df, &cols(&["product"]), "is_click").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingColumn(c)) if c == "is_click"
        ));
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let state = Encoder::smoothed_ctr(10.0)
            .fit(&ctr_fixture(), &cols(&["product"]), "is_click")
            .unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let back: EncoderState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, EncoderKind::SmoothedCtr);
        assert_eq!(back.columns["product"].mapping.len(), 2);
    }
}
