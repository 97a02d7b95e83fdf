//! Alignment of a scoring table to a trained model's feature layout

use anyhow::Result;
use polars::prelude::*;
use tracing::warn;

use super::schema::{has_column, MISSING_PLACEHOLDER};
use super::values::string_cells;

/// A table laid out exactly as the model expects.
#[derive(Debug, Clone)]
pub struct AlignedFrame {
    pub frame: DataFrame,
    /// Positions of categorical features in `frame`.
    pub cat_indices: Vec<usize>,
    /// Features the input lacked and that were filled with the placeholder.
    pub missing: Vec<String>,
}

/// Select `feature_names` in order, stringify categorical features and
/// substitute the placeholder for absent ones.
pub fn align_to_features(
    df: &DataFrame,
    feature_names: &[String],
    categorical: &[String],
) -> Result<AlignedFrame> {
    let height = df.height();
    let mut columns: Vec<Column> = Vec::with_capacity(feature_names.len());
    let mut cat_indices = Vec::new();
    let mut missing = Vec::new();

    for (i, name) in feature_names.iter().enumerate() {
        let is_categorical = categorical.contains(name);
        if is_categorical {
            cat_indices.push(i);
        }

        if !has_column(df, name) {
            warn!(feature = %name, "missing feature, filling with placeholder");
            missing.push(name.clone());
            columns.push(Column::new(
                name.as_str().into(),
                vec![MISSING_PLACEHOLDER; height],
            ));
            continue;
        }

        if is_categorical {
            let cells: Vec<String> = string_cells(df, name)?
                .into_iter()
                .map(|c| c.unwrap_or_else(|| MISSING_PLACEHOLDER.to_string()))
                .collect();
            columns.push(Column::new(name.as_str().into(), cells));
        } else {
            columns.push(df.column(name)?.clone());
        }
    }

    Ok(AlignedFrame {
        frame: DataFrame::new(columns)?,
        cat_indices,
        missing,
    })
}
