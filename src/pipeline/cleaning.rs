//! Row-level cleaning ahead of imputation
//!
//! Empty rows, rows without a session or label, duplicate sessions and
//! optional 3-sigma outliers are removed here. The external test file is also
//! brought in line with the training table's conventions.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use polars::prelude::*;
use tracing::{info, warn};

use super::schema::*;
use super::values::{f64_cells, filter_rows, label_cells, string_cells, write_string_cells};

/// Attach the stable `row_id` label (original row position) as the first column.
pub fn attach_row_id(mut df: DataFrame) -> Result<DataFrame> {
    if has_column(&df, ROW_ID) {
        return Ok(df);
    }
    let ids: Vec<u32> = (0..df.height() as u32).collect();
    df.insert_column(0, Column::new(ROW_ID.into(), ids))?;
    Ok(df)
}

/// Drop rows where every column other than `row_id` is null.
pub fn drop_empty_rows(df: &DataFrame) -> Result<DataFrame> {
    let height = df.height();
    let mut has_value = vec![false; height];

    for column in df.get_columns() {
        if column.name().as_str() == ROW_ID {
            continue;
        }
        let series = column.as_materialized_series();
        for (row, flag) in has_value.iter_mut().enumerate() {
            if !*flag && !series.get(row)?.is_null() {
                *flag = true;
            }
        }
    }

    let dropped = has_value.iter().filter(|v| !**v).count();
    if dropped > 0 {
        info!(dropped, "removed completely empty rows");
    }
    filter_rows(df, &has_value)
}

/// Keep the first row of each session. Rows with a null session id are kept
/// only when `keep_null_sessions` is set.
pub fn dedupe_sessions(df: &DataFrame, keep_null_sessions: bool) -> Result<DataFrame> {
    if !has_column(df, SESSION_ID) {
        return Ok(df.clone());
    }
    let sessions = string_cells(df, SESSION_ID)?;
    let mut seen: HashSet<&str> = HashSet::new();
    let keep: Vec<bool> = sessions
        .iter()
        .map(|s| match s {
            Some(id) => seen.insert(id.as_str()),
            None => keep_null_sessions,
        })
        .collect();

    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped > 0 {
        info!(dropped, "removed duplicate or unidentified sessions");
    }
    filter_rows(df, &keep)
}

/// Training-table hygiene: no null label, no null session, one row per session.
pub fn drop_unidentified_rows(df: &DataFrame, label: &str) -> Result<DataFrame> {
    let df = if has_column(df, label) {
        let labels = label_cells(df, label)?;
        let keep: Vec<bool> = labels.iter().map(Option::is_some).collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        if dropped > 0 {
            warn!(dropped, label, "removed rows without a label");
        }
        filter_rows(df, &keep)?
    } else {
        df.clone()
    };
    dedupe_sessions(&df, false)
}

/// Remove rows whose value in any of `columns` lies more than three sample
/// standard deviations from that column's mean. Nulls are kept.
pub fn remove_outliers(df: &DataFrame, columns: &[String]) -> Result<(DataFrame, usize)> {
    let mut keep = vec![true; df.height()];

    for name in columns {
        if !has_column(df, name) {
            continue;
        }
        let values = f64_cells(df, name)?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.len() < 2 {
            continue;
        }
        let n = present.len() as f64;
        let mean = present.iter().sum::<f64>() / n;
        let std = (present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();

        let mut removed = 0;
        for (flag, value) in keep.iter_mut().zip(values.iter()) {
            if let Some(v) = value {
                if *v > mean + 3.0 * std || *v < mean - 3.0 * std {
                    if *flag {
                        removed += 1;
                    }
                    *flag = false;
                }
            }
        }
        info!(column = %name, removed, "removed outliers");
    }

    let removed = keep.iter().filter(|k| !**k).count();
    Ok((filter_rows(df, &keep)?, removed))
}

/// The external file numbers user groups from 1; training data from 0.
pub fn shift_user_group(df: &DataFrame, by: i64) -> Result<DataFrame> {
    if !has_column(df, USER_GROUP_ID) {
        return Ok(df.clone());
    }
    let mut out = df.clone();
    let series = out.column(USER_GROUP_ID)?.as_materialized_series().clone();
    let shifted = &series - by;
    out.with_column(shifted)?;
    Ok(out)
}

/// Replace `user_depth` in `target` with the first known training value of
/// the same user; users unknown to training keep their own value.
pub fn user_depth_from_training(training: &DataFrame, target: &DataFrame) -> Result<DataFrame> {
    let cols = [USER_ID, USER_DEPTH];
    if !cols.iter().all(|c| has_column(training, c) && has_column(target, c)) {
        return Ok(target.clone());
    }

    let train_users = string_cells(training, USER_ID)?;
    let train_depth = string_cells(training, USER_DEPTH)?;
    let mut mapping: HashMap<&str, &str> = HashMap::new();
    for (user, depth) in train_users.iter().zip(train_depth.iter()) {
        if let (Some(u), Some(d)) = (user, depth) {
            mapping.entry(u.as_str()).or_insert(d.as_str());
        }
    }

    let users = string_cells(target, USER_ID)?;
    let depth = string_cells(target, USER_DEPTH)?;
    let mut replaced = 0usize;
    let aligned: Vec<Option<String>> = users
        .iter()
        .zip(depth)
        .map(|(user, own)| {
            match user.as_deref().and_then(|u| mapping.get(u)) {
                Some(known) => {
                    if own.as_deref() != Some(*known) {
                        replaced += 1;
                    }
                    Some(known.to_string())
                }
                None => own,
            }
        })
        .collect();

    info!(replaced, "aligned external user_depth to training users");
    let mut out = target.clone();
    write_string_cells(&mut out, USER_DEPTH, aligned)?;
    Ok(out)
}
