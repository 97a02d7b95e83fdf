//! Statistical fallback for values the deterministic imputer could not infer
//!
//! Each fallback column is resolved independently through three tiers:
//! the user's modal value, the user group's modal value, then the global
//! mode (level codes) or median (continuous values). Row order is preserved;
//! `row_id` stays the alignment key for callers.

use anyhow::Result;
use polars::prelude::*;
use tracing::{info, warn};

use super::schema::*;
use super::values::{
    f64_cells, filter_rows, grouped_mode, label_cells, median_of, mode_of, null_count,
    string_cells, string_cells_to_column, write_string_cells,
};

/// How a column's last-resort value is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Global mode.
    Categorical,
    /// Global median.
    Numeric,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackColumn {
    pub name: String,
    pub kind: ColumnKind,
}

impl FallbackColumn {
    pub fn categorical(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Categorical,
        }
    }

    pub fn numeric(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Numeric,
        }
    }
}

/// Nulls remaining per column after each tier.
#[derive(Debug, Clone, Default)]
pub struct FinishReport {
    pub before: Vec<(String, usize)>,
    pub after_primary: Vec<(String, usize)>,
    pub after_secondary: Vec<(String, usize)>,
    pub after_global: Vec<(String, usize)>,
    pub dropped_unlabeled: usize,
}

/// Three-tier fallback imputer.
#[derive(Debug, Clone)]
pub struct MissingValueFinisher {
    pub columns: Vec<FallbackColumn>,
    /// Identity whose modal value is tried first.
    pub primary_key: String,
    /// Coarser identity tried next.
    pub secondary_key: String,
    /// Pre-fill the categorical placement columns with the per-user mode.
    pub fill_cat: bool,
    pub label: String,
}

impl Default for MissingValueFinisher {
    fn default() -> Self {
        Self {
            columns: vec![
                FallbackColumn::categorical(AGE_LEVEL),
                FallbackColumn::numeric(CITY_DEVELOPMENT_INDEX),
                FallbackColumn::categorical(VAR_1),
                FallbackColumn::categorical(USER_DEPTH),
            ],
            primary_key: USER_ID.to_string(),
            secondary_key: USER_GROUP_ID.to_string(),
            fill_cat: false,
            label: IS_CLICK.to_string(),
        }
    }
}

impl MissingValueFinisher {
    pub fn with_fill_cat(mut self, fill_cat: bool) -> Self {
        self.fill_cat = fill_cat;
        self
    }

    /// Resolve remaining nulls. Rows whose label is still null are dropped
    /// when `is_training` is set.
    pub fn finish(&self, df: &DataFrame, is_training: bool) -> Result<(DataFrame, FinishReport)> {
        let mut df = df.clone();
        let mut report = FinishReport::default();

        let total_nulls: usize = df.get_columns().iter().map(|c| c.null_count()).sum();
        info!(nulls = total_nulls, "finishing missing values");

        fill_unknown_user(&mut df)?;
        merge_product_category(&mut df)?;

        if self.fill_cat {
            let cat_cols = [
                PRODUCT,
                CAMPAIGN_ID,
                WEBPAGE_ID,
                GENDER,
                PRODUCT_CATEGORY,
                USER_GROUP_ID,
            ];
            for name in cat_cols {
                if has_column(&df, name) {
                    broadcast_group_mode(&mut df, name, &self.primary_key)?;
                }
            }
        }

        let columns: Vec<&FallbackColumn> = self
            .columns
            .iter()
            .filter(|c| has_column(&df, &c.name))
            .collect();
        let counts = |df: &DataFrame| -> Vec<(String, usize)> {
            columns
                .iter()
                .map(|c| (c.name.clone(), null_count(df, &c.name)))
                .collect()
        };
        let remaining = |counts: &[(String, usize)]| counts.iter().map(|(_, n)| n).sum::<usize>();

        report.before = counts(&df);

        for column in &columns {
            broadcast_group_mode(&mut df, &column.name, &self.primary_key)?;
        }
        report.after_primary = counts(&df);

        if remaining(&report.after_primary) > 0 {
            warn!(remaining = ?report.after_primary, key = %self.secondary_key, "falling back to secondary group mode");
            for column in &columns {
                fill_nulls_with_group_mode(&mut df, &column.name, &self.secondary_key)?;
            }
        }
        report.after_secondary = counts(&df);

        if remaining(&report.after_secondary) > 0 {
            warn!(remaining = ?report.after_secondary, "falling back to global statistics");
            for column in &columns {
                fill_nulls_with_global(&mut df, column)?;
            }
        }
        report.after_global = counts(&df);

        if is_training && has_column(&df, &self.label) {
            let labels = label_cells(&df, &self.label)?;
            let keep: Vec<bool> = labels.iter().map(Option::is_some).collect();
            report.dropped_unlabeled = keep.iter().filter(|k| !**k).count();
            if report.dropped_unlabeled > 0 {
                warn!(
                    rows = report.dropped_unlabeled,
                    label = %self.label,
                    "rows still missing a label, dropping them"
                );
                df = filter_rows(&df, &keep)?;
            }
        }

        Ok((df, report))
    }
}

/// Null users become the integral identity `-1`.
pub fn fill_unknown_user(df: &mut DataFrame) -> Result<()> {
    if !has_column(df, USER_ID) {
        return Ok(());
    }
    let users: Vec<Option<i64>> = f64_cells(df, USER_ID)?
        .into_iter()
        .map(|v| Some(v.map(|n| n as i64).unwrap_or(-1)))
        .collect();
    df.with_column(Column::new(USER_ID.into(), users))?;
    Ok(())
}

/// Coalesce the two mutually exclusive category columns into
/// `product_category` and drop the sources.
///
/// The merged column takes the first present source's dtype. An integer
/// dtype widens to `Float64` (or `String`) rather than truncate a value.
pub fn merge_product_category(df: &mut DataFrame) -> Result<()> {
    let first = has_column(df, PRODUCT_CATEGORY_1);
    let second = has_column(df, PRODUCT_CATEGORY_2);
    if !first && !second {
        return Ok(());
    }

    let source = if first { PRODUCT_CATEGORY_1 } else { PRODUCT_CATEGORY_2 };
    let mut dtype = df.column(source)?.dtype().clone();
    let primary = if first {
        string_cells(df, PRODUCT_CATEGORY_1)?
    } else {
        vec![None; df.height()]
    };
    let secondary = if second {
        string_cells(df, PRODUCT_CATEGORY_2)?
    } else {
        vec![None; df.height()]
    };
    let mut merged: Vec<Option<String>> =
        primary.into_iter().zip(secondary).map(|(a, b)| a.or(b)).collect();

    if dtype.is_integer() {
        merged = merged.into_iter().map(|c| c.map(integral_cell)).collect();
        let cells = || merged.iter().flatten();
        if cells().any(|c| c.parse::<i64>().is_err()) {
            dtype = if cells().all(|c| c.parse::<f64>().is_ok()) {
                DataType::Float64
            } else {
                DataType::String
            };
        }
    }

    let sources: Vec<&str> = [PRODUCT_CATEGORY_1, PRODUCT_CATEGORY_2]
        .into_iter()
        .filter(|c| has_column(df, c))
        .collect();
    let mut out = df.drop_many(sources);
    out.with_column(string_cells_to_column(PRODUCT_CATEGORY, merged, &dtype)?)?;
    *df = out;
    Ok(())
}

/// "7.0" becomes "7"; anything else is returned unchanged.
fn integral_cell(cell: String) -> String {
    if cell.parse::<i64>().is_ok() {
        return cell;
    }
    match cell.parse::<f64>() {
        Ok(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => format!("{}", n as i64),
        _ => cell,
    }
}

/// Broadcast each group's modal value to every row of the group, including
/// rows that already had a value. Groups without any value are left alone.
pub fn broadcast_group_mode(df: &mut DataFrame, column: &str, group_by: &str) -> Result<()> {
    if !has_column(df, group_by) {
        return Ok(());
    }
    let keys = string_cells(df, group_by)?;
    let values = string_cells(df, column)?;
    let modes = grouped_mode(&keys, &values);

    let updated: Vec<Option<String>> = keys
        .iter()
        .zip(values)
        .map(|(k, v)| k.as_ref().and_then(|k| modes.get(k).cloned()).or(v))
        .collect();
    write_string_cells(df, column, updated)
}

/// Fill only null cells with their group's modal value.
pub fn fill_nulls_with_group_mode(df: &mut DataFrame, column: &str, group_by: &str) -> Result<()> {
    if !has_column(df, group_by) || null_count(df, column) == 0 {
        return Ok(());
    }
    let keys = string_cells(df, group_by)?;
    let values = string_cells(df, column)?;
    let modes = grouped_mode(&keys, &values);

    let updated: Vec<Option<String>> = keys
        .iter()
        .zip(values)
        .map(|(k, v)| v.or_else(|| k.as_ref().and_then(|k| modes.get(k).cloned())))
        .collect();
    write_string_cells(df, column, updated)
}

/// Fill null cells with the global mode or median of the column.
pub fn fill_nulls_with_global(df: &mut DataFrame, column: &FallbackColumn) -> Result<()> {
    if null_count(df, &column.name) == 0 {
        return Ok(());
    }
    let values = string_cells(df, &column.name)?;
    let fallback = match column.kind {
        ColumnKind::Categorical => mode_of(values.iter().flatten().map(String::as_str)),
        ColumnKind::Numeric => {
            let present: Vec<f64> = f64_cells(df, &column.name)?.into_iter().flatten().collect();
            median_of(&present).map(|m| format!("{}", m))
        }
    };

    let Some(fallback) = fallback else {
        warn!(column = %column.name, "column has no values at all, nothing to fall back to");
        return Ok(());
    };

    if column.kind == ColumnKind::Numeric && df.column(&column.name)?.dtype().is_integer() {
        // A fractional median does not fit an integer column.
        let filled: Vec<Option<f64>> = f64_cells(df, &column.name)?
            .into_iter()
            .map(|v| v.or_else(|| fallback.parse().ok()))
            .collect();
        df.with_column(Column::new(column.name.as_str().into(), filled))?;
        return Ok(());
    }

    let filled: Vec<Option<String>> = values
        .into_iter()
        .map(|v| v.or_else(|| Some(fallback.clone())))
        .collect();
    write_string_cells(df, &column.name, filled)
}
