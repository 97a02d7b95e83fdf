//! Cell-level helpers shared by the column-oriented stages
//!
//! The imputation and encoding stages work on plain vectors of optional
//! string cells: integers, floats and strings all compare by their rendered
//! value, which lets a key like `campaign_id == 396664` match regardless of
//! whether the column was inferred as Int64 or Float64. Filled vectors are
//! cast back to the column's original dtype when written.

use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::{Context, Result};
use polars::prelude::*;

use super::error::PipelineError;
use super::schema::has_column;

/// Convert a column to a Vec of Option<String> for comparison
pub fn column_to_string_vec(col: &Column) -> Result<Vec<Option<String>>> {
    let values: Vec<Option<String>> = match col.dtype() {
        DataType::String => col
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect(),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            let cast = col.cast(&DataType::Int64)?;
            cast.i64()?
                .into_iter()
                .map(|v| v.map(|n| n.to_string()))
                .collect()
        }
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            let cast = col.cast(&DataType::UInt64)?;
            cast.u64()?
                .into_iter()
                .map(|v| v.map(|n| n.to_string()))
                .collect()
        }
        DataType::Float32 | DataType::Float64 => {
            let cast = col.cast(&DataType::Float64)?;
            cast.f64()?
                .into_iter()
                .map(|v| v.and_then(|n| if n.is_nan() { None } else { Some(format!("{}", n)) }))
                .collect()
        }
        DataType::Boolean => col
            .bool()?
            .into_iter()
            .map(|v| v.map(|b| b.to_string()))
            .collect(),
        _ => {
            let cast = col.cast(&DataType::String)?;
            cast.str()?
                .into_iter()
                .map(|v| v.map(|s| s.to_string()))
                .collect()
        }
    };

    Ok(values)
}

/// Read a named column as string cells, failing with `MissingColumn` if absent.
pub fn string_cells(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    if !has_column(df, name) {
        return Err(PipelineError::MissingColumn(name.to_string()).into());
    }
    column_to_string_vec(df.column(name)?)
}

/// Read a named column as f64 cells. Values that do not parse become None.
pub fn f64_cells(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    if !has_column(df, name) {
        return Err(PipelineError::MissingColumn(name.to_string()).into());
    }
    let cast = df
        .column(name)?
        .cast(&DataType::Float64)
        .with_context(|| format!("Column '{}' cannot be read as numeric", name))?;
    Ok(cast
        .f64()?
        .into_iter()
        .map(|v| v.filter(|n| !n.is_nan()))
        .collect())
}

/// Read the label column as integers; anything non-numeric is None.
pub fn label_cells(df: &DataFrame, label: &str) -> Result<Vec<Option<i64>>> {
    Ok(f64_cells(df, label)?
        .into_iter()
        .map(|v| v.map(|n| n.round() as i64))
        .collect())
}

/// A label participates in statistics only when it is a known 0/1 outcome.
#[inline]
pub fn is_valid_label(label: Option<i64>) -> bool {
    matches!(label, Some(0) | Some(1))
}

/// Build a column from string cells and cast it back to `dtype`.
pub fn string_cells_to_column(
    name: &str,
    values: Vec<Option<String>>,
    dtype: &DataType,
) -> Result<Column> {
    let column = Column::new(name.into(), values);
    if *dtype == DataType::String {
        return Ok(column);
    }
    column
        .cast(dtype)
        .with_context(|| format!("Failed to restore dtype {} for column '{}'", dtype, name))
}

/// Replace a column in place with the given string cells, keeping its dtype.
pub fn write_string_cells(
    df: &mut DataFrame,
    name: &str,
    values: Vec<Option<String>>,
) -> Result<()> {
    let dtype = df.column(name)?.dtype().clone();
    let column = string_cells_to_column(name, values, &dtype)?;
    df.with_column(column)?;
    Ok(())
}

/// Order two cells: numerically when both parse as numbers, else lexically.
pub fn compare_cells(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Most frequent value; ties resolve to the smallest value.
pub fn mode_of<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then_with(|| compare_cells(vb, va)))
        .map(|(v, _)| v.to_string())
}

/// Median of the present values.
pub fn median_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Per-group mode of `values`, keyed by the string form of `keys`.
/// Rows with a null key or null value do not contribute.
pub fn grouped_mode(keys: &[Option<String>], values: &[Option<String>]) -> HashMap<String, String> {
    let mut groups: HashMap<&str, Vec<&str>> = HashMap::new();
    for (key, value) in keys.iter().zip(values.iter()) {
        if let (Some(k), Some(v)) = (key, value) {
            groups.entry(k.as_str()).or_default().push(v.as_str());
        }
    }

    groups
        .into_iter()
        .filter_map(|(k, vs)| mode_of(vs).map(|m| (k.to_string(), m)))
        .collect()
}

/// Count of null cells in a column, 0 when the column is absent.
pub fn null_count(df: &DataFrame, name: &str) -> usize {
    if !has_column(df, name) {
        return 0;
    }
    df.column(name).map(|c| c.null_count()).unwrap_or(0)
}

/// Keep rows by position, in the order given.
pub fn take_rows(df: &DataFrame, positions: &[usize]) -> Result<DataFrame> {
    let idx: Vec<IdxSize> = positions.iter().map(|&p| p as IdxSize).collect();
    let idx = IdxCa::from_vec("idx".into(), idx);
    Ok(df.take(&idx)?)
}

/// Keep rows where `keep` is true.
pub fn filter_rows(df: &DataFrame, keep: &[bool]) -> Result<DataFrame> {
    let mask = BooleanChunked::from_slice("keep".into(), keep);
    Ok(df.filter(&mask)?)
}
