//! Feature generation for one partition
//!
//! The training partition is run through [`FeatureGenerator::fit_transform`],
//! which returns the frozen [`FittedFeatures`]; every other partition goes
//! through [`FeatureGenerator::transform`] with that state.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::Result;
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::encoders::{EncoderBank, FittedEncoders};
use super::error::PipelineError;
use super::finisher::{
    fill_nulls_with_global, fill_nulls_with_group_mode, merge_product_category, FallbackColumn,
};
use super::schema::*;
use super::values::{compare_cells, string_cells};

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a timestamp cell. Unparseable values are None.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureOptions {
    pub use_encoders: bool,
    pub mark_categorical: bool,
    pub use_dummies: bool,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self {
            use_encoders: true,
            mark_categorical: true,
            use_dummies: false,
        }
    }
}

/// Everything learnt from the training partition that later partitions reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedFeatures {
    pub encoders: Option<FittedEncoders>,
    /// One-hot levels per column, frozen at fit time.
    pub dummy_levels: BTreeMap<String, Vec<String>>,
    /// Training feature order, excluding `row_id` and the label.
    pub feature_names: Vec<String>,
    pub categorical: Vec<String>,
    pub label: String,
    pub created_at: String,
}

impl FittedFeatures {
    /// Positions of the categorical features within `feature_names`.
    pub fn categorical_indices(&self) -> Vec<usize> {
        self.feature_names
            .iter()
            .enumerate()
            .filter(|(_, name)| self.categorical.contains(name))
            .map(|(i, _)| i)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct FeatureGenerator {
    pub options: FeatureOptions,
    pub bank: EncoderBank,
    pub label: String,
}

impl FeatureGenerator {
    pub fn new(options: FeatureOptions, bank: EncoderBank) -> Self {
        Self {
            options,
            bank,
            label: IS_CLICK.to_string(),
        }
    }

    /// Fit encoders and dummy levels on `df` and derive its features.
    pub fn fit_transform(&self, df: &DataFrame) -> Result<(DataFrame, FittedFeatures)> {
        let mut df = df.clone();
        merge_product_category(&mut df)?;

        let encoders = if self.options.use_encoders {
            let target_columns: Vec<String> = df
                .get_column_names()
                .iter()
                .map(|c| c.to_string())
                .filter(|c| ![SESSION_ID, DATE_TIME, ROW_ID, self.label.as_str()].contains(&c.as_str()))
                .collect();
            let ctr_columns: Vec<String> = CTR_COLUMNS
                .iter()
                .filter(|c| has_column(&df, c))
                .map(|c| c.to_string())
                .collect();
            let fitted = self.bank.fit(&df, &target_columns, &ctr_columns, &self.label)?;
            df = fitted.transform(&df)?;
            Some(fitted)
        } else {
            None
        };

        df = self.derive_shared(df)?;

        let mut dummy_levels = BTreeMap::new();
        if self.options.use_dummies {
            for column in DUMMY_COLUMNS.iter().filter(|c| has_column(&df, c)) {
                dummy_levels.insert(column.to_string(), distinct_levels(&df, column)?);
            }
            df = one_hot(&df, &dummy_levels)?;
        }

        let feature_names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .filter(|c| c != ROW_ID && *c != self.label)
            .collect();
        let categorical = if self.options.mark_categorical {
            CATEGORICAL_COLUMNS
                .iter()
                .filter(|c| feature_names.iter().any(|f| f == *c))
                .map(|c| c.to_string())
                .collect()
        } else {
            Vec::new()
        };

        info!(
            features = feature_names.len(),
            categorical = categorical.len(),
            rows = df.height(),
            "generated training features"
        );

        let fitted = FittedFeatures {
            encoders,
            dummy_levels,
            feature_names,
            categorical,
            label: self.label.clone(),
            created_at: Utc::now().to_rfc3339(),
        };
        Ok((df, fitted))
    }

    /// Derive features for a held-out partition with frozen state. The result
    /// holds `row_id`, the training features in training order, and the label
    /// when present.
    pub fn transform(&self, df: &DataFrame, fitted: &FittedFeatures) -> Result<DataFrame> {
        let df = self.derive(df, fitted)?;

        let mut ordered: Vec<&str> = Vec::with_capacity(fitted.feature_names.len() + 2);
        if has_column(&df, ROW_ID) {
            ordered.push(ROW_ID);
        }
        for name in &fitted.feature_names {
            if !has_column(&df, name) {
                return Err(PipelineError::MissingColumn(name.clone()).into());
            }
            ordered.push(name);
        }
        if has_column(&df, &fitted.label) {
            ordered.push(&fitted.label);
        }
        debug!(rows = df.height(), "transformed held-out features");
        Ok(df.select(ordered)?)
    }

    /// Apply frozen state without enforcing the training layout. Source
    /// columns the table lacks simply produce no derived column.
    pub fn derive(&self, df: &DataFrame, fitted: &FittedFeatures) -> Result<DataFrame> {
        let mut df = df.clone();
        merge_product_category(&mut df)?;
        if let Some(encoders) = &fitted.encoders {
            df = encoders.transform_present(&df)?;
        }
        df = self.derive_shared(df)?;
        if !fitted.dummy_levels.is_empty() {
            df = one_hot(&df, &fitted.dummy_levels)?;
        }
        Ok(df)
    }

    /// Steps that hold no fitted state.
    fn derive_shared(&self, mut df: DataFrame) -> Result<DataFrame> {
        if has_column(&df, DATE_TIME) {
            add_calendar_fields(&mut df)?;
            add_campaign_duration(&mut df)?;
        } else {
            debug!("no {} column, skipping calendar features", DATE_TIME);
        }

        let dropped: Vec<&str> = DROPPED_AFTER_FEATURES
            .into_iter()
            .filter(|c| has_column(&df, c))
            .collect();
        df = df.drop_many(dropped);

        if self.options.mark_categorical {
            mark_categorical(&mut df)?;
        }
        Ok(df)
    }
}

/// `Day`, `Hour`, `Minute` and `weekday` (Monday = 0) from `DateTime`.
/// Unparseable timestamps get the user's modal value, then the global mode.
pub fn add_calendar_fields(df: &mut DataFrame) -> Result<()> {
    let stamps: Vec<Option<NaiveDateTime>> = string_cells(df, DATE_TIME)?
        .iter()
        .map(|c| c.as_deref().and_then(parse_timestamp))
        .collect();

    let field = |f: fn(&NaiveDateTime) -> i64| -> Vec<Option<i64>> {
        stamps.iter().map(|s| s.as_ref().map(f)).collect()
    };
    df.with_column(Column::new(DAY.into(), field(|t| t.day() as i64)))?;
    df.with_column(Column::new(HOUR.into(), field(|t| t.hour() as i64)))?;
    df.with_column(Column::new(MINUTE.into(), field(|t| t.minute() as i64)))?;
    df.with_column(Column::new(
        WEEKDAY.into(),
        field(|t| t.weekday().num_days_from_monday() as i64),
    ))?;

    let unparsed = stamps.iter().filter(|s| s.is_none()).count();
    if unparsed > 0 {
        debug!(rows = unparsed, "filling calendar fields for unparseable timestamps");
        for name in CALENDAR_COLUMNS {
            if has_column(df, USER_ID) {
                fill_nulls_with_group_mode(df, name, USER_ID)?;
            }
            fill_nulls_with_global(df, &FallbackColumn::categorical(name))?;
        }
    }
    Ok(())
}

/// Hours between each row's timestamp and the earliest timestamp of its
/// campaign within this partition.
pub fn add_campaign_duration(df: &mut DataFrame) -> Result<()> {
    if !has_column(df, CAMPAIGN_ID) {
        return Ok(());
    }
    let stamps: Vec<Option<NaiveDateTime>> = string_cells(df, DATE_TIME)?
        .iter()
        .map(|c| c.as_deref().and_then(parse_timestamp))
        .collect();
    let campaigns = string_cells(df, CAMPAIGN_ID)?;

    let mut start: HashMap<&str, NaiveDateTime> = HashMap::new();
    for (campaign, stamp) in campaigns.iter().zip(stamps.iter()) {
        if let (Some(c), Some(t)) = (campaign, stamp) {
            start
                .entry(c.as_str())
                .and_modify(|s| {
                    if *t < *s {
                        *s = *t;
                    }
                })
                .or_insert(*t);
        }
    }

    let durations: Vec<Option<f64>> = campaigns
        .iter()
        .zip(stamps.iter())
        .map(|(campaign, stamp)| {
            let c = campaign.as_deref()?;
            let t = stamp.as_ref()?;
            let s = start.get(c)?;
            Some((*t - *s).num_seconds() as f64 / 3600.0)
        })
        .collect();
    df.with_column(Column::new(CAMPAIGN_DURATION_HOURS.into(), durations))?;

    if df.column(CAMPAIGN_DURATION_HOURS)?.null_count() == 0 {
        return Ok(());
    }
    fill_nulls_with_group_mode(df, CAMPAIGN_DURATION_HOURS, CAMPAIGN_ID)?;
    if has_column(df, WEBPAGE_ID) {
        let pages = string_cells(df, WEBPAGE_ID)?;
        let mut hours: Vec<Option<f64>> = df
            .column(CAMPAIGN_DURATION_HOURS)?
            .f64()?
            .into_iter()
            .collect();
        fill_within_groups(&pages, &mut hours);
        df.with_column(Column::new(CAMPAIGN_DURATION_HOURS.into(), hours))?;
    }
    Ok(())
}

/// Forward then backward fill inside each group, following row order.
pub fn fill_within_groups(keys: &[Option<String>], values: &mut [Option<f64>]) {
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (row, key) in keys.iter().enumerate() {
        if let Some(k) = key {
            groups.entry(k.as_str()).or_default().push(row);
        }
    }

    for rows in groups.values() {
        let mut last = None;
        for &row in rows {
            match values[row] {
                Some(v) => last = Some(v),
                None => values[row] = last,
            }
        }
        let mut next = None;
        for &row in rows.iter().rev() {
            match values[row] {
                Some(v) => next = Some(v),
                None => values[row] = next,
            }
        }
    }
}

/// Categorical columns become strings, with nulls as the placeholder.
pub fn mark_categorical(df: &mut DataFrame) -> Result<()> {
    let present: Vec<&str> = CATEGORICAL_COLUMNS
        .into_iter()
        .filter(|c| has_column(df, c))
        .collect();
    for name in present {
        let cells: Vec<String> = string_cells(df, name)?
            .into_iter()
            .map(|c| c.unwrap_or_else(|| MISSING_PLACEHOLDER.to_string()))
            .collect();
        df.with_column(Column::new(name.into(), cells))?;
    }
    Ok(())
}

fn distinct_levels(df: &DataFrame, column: &str) -> Result<Vec<String>> {
    let levels: BTreeSet<String> = string_cells(df, column)?.into_iter().flatten().collect();
    let mut levels: Vec<String> = levels.into_iter().collect();
    levels.sort_by(|a, b| compare_cells(a, b));
    Ok(levels)
}

/// Replace each column with one boolean `{col}_{level}` column per frozen
/// level. Values outside the frozen levels set no indicator; absent columns
/// are skipped.
pub fn one_hot(df: &DataFrame, levels: &BTreeMap<String, Vec<String>>) -> Result<DataFrame> {
    let mut out = df.clone();
    for (column, column_levels) in levels {
        if !has_column(&out, column) {
            debug!(column = %column, "no source column for one-hot levels");
            continue;
        }
        let cells = string_cells(&out, column)?;
        out = out.drop(column)?;
        for level in column_levels {
            let flags: Vec<bool> = cells.iter().map(|c| c.as_deref() == Some(level.as_str())).collect();
            out.with_column(Column::new(format!("{}_{}", column, level).into(), flags))?;
        }
    }
    Ok(out)
}
