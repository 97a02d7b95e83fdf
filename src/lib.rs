//! clickprep: Click-Log Preprocessing Library
//!
//! Cleaning, fixed-point rule-based imputation, statistical fallback,
//! leakage-safe target/CTR encoding and stratified splitting for
//! click-through-rate modelling.

pub mod cli;
pub mod pipeline;
pub mod report;
pub mod utils;
