//! Shared test utilities and fixture generators

#![allow(dead_code)]

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use tempfile::TempDir;

const PRODUCTS: [&str; 6] = ["A", "B", "C", "D", "E", "F"];
const CAMPAIGNS: [(i64, i64); 4] = [(359520, 13787), (405490, 60305), (360936, 1734), (118601, 28529)];

/// Per-user attributes shared by every impression of that user.
struct User {
    id: i64,
    group: i64,
    gender: &'static str,
    age: i64,
    depth: f64,
    city: Option<f64>,
    var_1: i64,
}

fn users(n: usize, rng: &mut StdRng) -> Vec<User> {
    (0..n)
        .map(|i| {
            let age = rng.gen_range(1..=6);
            let gender = if rng.gen_bool(0.8) { "Male" } else { "Female" };
            User {
                id: 1000 + i as i64,
                group: if gender == "Male" { age } else { age + 6 },
                gender,
                age,
                depth: rng.gen_range(1..=3) as f64,
                city: if rng.gen_bool(0.7) {
                    Some(rng.gen_range(1..=4) as f64)
                } else {
                    None
                },
                var_1: rng.gen_range(0..=1),
            }
        })
        .collect()
}

/// Synthetic impression log with the raw column layout, about 20% clicks and
/// a sprinkling of nulls in user attributes and placements.
pub fn create_click_log(rows: usize, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let people = users((rows / 4).max(1), &mut rng);

    let mut session_id = Vec::with_capacity(rows);
    let mut date_time = Vec::with_capacity(rows);
    let mut user_id = Vec::with_capacity(rows);
    let mut product = Vec::with_capacity(rows);
    let mut campaign_id = Vec::with_capacity(rows);
    let mut webpage_id = Vec::with_capacity(rows);
    let mut category_1 = Vec::with_capacity(rows);
    let mut category_2: Vec<Option<f64>> = Vec::with_capacity(rows);
    let mut user_group_id = Vec::with_capacity(rows);
    let mut gender = Vec::with_capacity(rows);
    let mut age_level = Vec::with_capacity(rows);
    let mut user_depth = Vec::with_capacity(rows);
    let mut city = Vec::with_capacity(rows);
    let mut var_1 = Vec::with_capacity(rows);
    let mut is_click = Vec::with_capacity(rows);

    for i in 0..rows {
        let user = &people[i % people.len()];
        let (campaign, page) = CAMPAIGNS[rng.gen_range(0..CAMPAIGNS.len())];
        let null = |rng: &mut StdRng| rng.gen_bool(0.05);

        session_id.push(i as i64 + 1);
        date_time.push(format!(
            "2017-07-{:02} {:02}:{:02}",
            rng.gen_range(2..=7),
            rng.gen_range(0..24),
            rng.gen_range(0..60)
        ));
        user_id.push(Some(user.id));
        product.push(PRODUCTS[rng.gen_range(0..PRODUCTS.len())]);
        campaign_id.push(if null(&mut rng) { None } else { Some(campaign) });
        webpage_id.push(if null(&mut rng) { None } else { Some(page) });
        if rng.gen_bool(0.2) {
            category_1.push(None);
            category_2.push(Some(rng.gen_range(1..=3) as f64 * 1000.0));
        } else {
            category_1.push(Some(rng.gen_range(1..=5) as i64));
            category_2.push(None);
        }
        user_group_id.push(if null(&mut rng) { None } else { Some(user.group) });
        gender.push(if null(&mut rng) { None } else { Some(user.gender) });
        age_level.push(if null(&mut rng) { None } else { Some(user.age) });
        user_depth.push(if null(&mut rng) { None } else { Some(user.depth) });
        city.push(if null(&mut rng) { None } else { user.city });
        var_1.push(user.var_1);
        is_click.push(if rng.gen_bool(0.2) { 1i64 } else { 0 });
    }

    df! {
        "session_id" => session_id,
        "DateTime" => date_time,
        "user_id" => user_id,
        "product" => product,
        "campaign_id" => campaign_id,
        "webpage_id" => webpage_id,
        "product_category_1" => category_1,
        "product_category_2" => category_2,
        "user_group_id" => user_group_id,
        "gender" => gender,
        "age_level" => age_level,
        "user_depth" => user_depth,
        "city_development_index" => city,
        "var_1" => var_1,
        "is_click" => is_click,
    }
    .unwrap()
}

/// Same layout without the label, user groups numbered from 1.
pub fn create_external_log(rows: usize, seed: u64) -> DataFrame {
    let df = create_click_log(rows, seed);
    let shifted = df.column("user_group_id").unwrap().as_materialized_series() + 1;
    let mut df = df.drop("is_click").unwrap();
    df.with_column(shifted).unwrap();
    df
}

/// 100 rows over 25 users; five rows lose `user_depth`, each from a user
/// with other known rows.
pub fn create_user_depth_scenario() -> DataFrame {
    let user_id: Vec<i64> = (0..100).map(|i| i % 25).collect();
    let user_depth: Vec<Option<f64>> = (0..100)
        .map(|i| {
            if [3, 17, 42, 58, 99].contains(&i) {
                None
            } else {
                Some(((i % 25) % 3 + 1) as f64)
            }
        })
        .collect();
    df! {
        "user_id" => user_id,
        "user_depth" => user_depth,
    }
    .unwrap()
}

/// Create a temporary directory with a test CSV file
pub fn create_temp_csv(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("train.csv");

    let mut file = std::fs::File::create(&csv_path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();

    (temp_dir, csv_path)
}

/// Create a temporary directory with a test Parquet file
pub fn create_temp_parquet(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let parquet_path = temp_dir.path().join("train.parquet");

    let file = std::fs::File::create(&parquet_path).unwrap();
    ParquetWriter::new(file).finish(df).unwrap();

    (temp_dir, parquet_path)
}

/// Assert that a DataFrame contains specific columns
pub fn assert_has_columns(df: &DataFrame, expected_cols: &[&str]) {
    let actual_cols: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for col in expected_cols {
        assert!(
            actual_cols.contains(&col.to_string()),
            "Missing expected column: '{}'. Actual columns: {:?}",
            col,
            actual_cols
        );
    }
}

/// Assert that a DataFrame does NOT contain specific columns
pub fn assert_missing_columns(df: &DataFrame, unexpected_cols: &[&str]) {
    let actual_cols: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for col in unexpected_cols {
        assert!(
            !actual_cols.contains(&col.to_string()),
            "Unexpected column still present: '{}'",
            col
        );
    }
}

/// Click rate of an integer label column.
pub fn click_rate(df: &DataFrame, label: &str) -> f64 {
    let labels = df.column(label).unwrap().cast(&DataType::Int64).unwrap();
    let labels = labels.i64().unwrap();
    let clicks = labels.into_iter().filter(|v| *v == Some(1)).count();
    clicks as f64 / df.height() as f64
}
