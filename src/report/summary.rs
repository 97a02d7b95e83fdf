//! End-of-run summary table

use std::time::Duration;

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;

use crate::pipeline::{FoldSummary, PreprocessOutput};

/// Counts shown after a preprocessing run
#[derive(Debug, Default)]
pub struct PreprocessSummary {
    pub rows_loaded: usize,
    pub rows_cleaned: usize,
    pub imputed_cells: Option<usize>,
    pub imputer_passes: Option<usize>,
    pub outliers_removed: usize,
    pub unlabeled_dropped: usize,
    pub remaining_nulls: usize,
    pub features: usize,
    pub categorical: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub external_rows: Option<usize>,
    pub folds: Vec<FoldSummary>,
    pub elapsed: Duration,
}

impl PreprocessSummary {
    pub fn from_output(output: &PreprocessOutput, elapsed: Duration) -> Self {
        let stats = &output.stats;
        Self {
            rows_loaded: stats.rows_loaded,
            rows_cleaned: stats.rows_cleaned,
            imputed_cells: stats.impute.as_ref().map(|r| r.total_fills()),
            imputer_passes: stats.impute.as_ref().map(|r| r.passes),
            outliers_removed: stats.outliers_removed,
            unlabeled_dropped: stats.finish.as_ref().map(|f| f.dropped_unlabeled).unwrap_or(0),
            remaining_nulls: stats.remaining_nulls,
            features: output.fitted.feature_names.len(),
            categorical: output.fitted.categorical.len(),
            train_rows: output.x_train.height(),
            test_rows: output.x_test.height(),
            external_rows: output.x_external.as_ref().map(|df| df.height()),
            folds: output.folds.clone(),
            elapsed,
        }
    }

    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Metric").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);

        table.add_row(vec![Cell::new("📁 Rows loaded"), Cell::new(self.rows_loaded)]);
        table.add_row(vec![Cell::new("🧹 Rows after cleaning"), Cell::new(self.rows_cleaned)]);

        if let (Some(cells), Some(passes)) = (self.imputed_cells, self.imputer_passes) {
            table.add_row(vec![
                Cell::new("🔁 Cells inferred"),
                Cell::new(format!("{} ({} passes)", cells, passes)).fg(Color::Cyan),
            ]);
        }

        table.add_row(vec![
            Cell::new("📉 Outliers removed"),
            Cell::new(self.outliers_removed).fg(if self.outliers_removed == 0 {
                Color::White
            } else {
                Color::Yellow
            }),
        ]);
        table.add_row(vec![
            Cell::new("🗑️  Unlabelled rows dropped"),
            Cell::new(self.unlabeled_dropped).fg(if self.unlabeled_dropped == 0 {
                Color::White
            } else {
                Color::Red
            }),
        ]);
        table.add_row(vec![
            Cell::new("❔ Nulls remaining"),
            Cell::new(self.remaining_nulls).fg(if self.remaining_nulls == 0 {
                Color::Green
            } else {
                Color::Red
            }),
        ]);
        table.add_row(vec![
            Cell::new("✅ Features"),
            Cell::new(format!("{} ({} categorical)", self.features, self.categorical))
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
        ]);
        table.add_row(vec![
            Cell::new("🧪 Train / test rows"),
            Cell::new(format!("{} / {}", self.train_rows, self.test_rows)),
        ]);
        if let Some(rows) = self.external_rows {
            table.add_row(vec![Cell::new("🌐 External rows"), Cell::new(rows)]);
        }
        table.add_row(vec![
            Cell::new("⏱️  Elapsed"),
            Cell::new(format!("{:.2}s", self.elapsed.as_secs_f64())),
        ]);
        table
    }

    fn fold_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Fold").add_attribute(Attribute::Bold),
            Cell::new("Train").add_attribute(Attribute::Bold),
            Cell::new("Validation").add_attribute(Attribute::Bold),
            Cell::new("Val. click rate").add_attribute(Attribute::Bold),
        ]);
        for fold in &self.folds {
            table.add_row(vec![
                Cell::new(fold.index),
                Cell::new(fold.train_rows),
                Cell::new(fold.validation_rows),
                Cell::new(format!("{:.2}%", fold.validation_click_rate * 100.0)),
            ]);
        }
        table
    }

    pub fn display(&self) {
        println!();
        println!(
            "    {} {}",
            style("📋").cyan(),
            style("PREPROCESSING SUMMARY").white().bold()
        );
        println!("    {}", style("─".repeat(50)).dim());
        println!();

        for line in self.table().to_string().lines() {
            println!("    {}", line);
        }

        if !self.folds.is_empty() {
            println!();
            println!(
                "    {} {}",
                style("🧩").cyan(),
                style("STRATIFIED FOLDS").white().bold()
            );
            println!("    {}", style("─".repeat(50)).dim());
            for line in self.fold_table().to_string().lines() {
                println!("    {}", line);
            }
        }
    }
}
