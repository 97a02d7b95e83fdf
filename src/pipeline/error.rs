//! Error types for the preprocessing pipeline.
//!
//! Orchestration code returns `anyhow::Result`; the variants here are the
//! domain failures a caller may want to match on via `downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

use super::encoders::EncoderKind;

/// Failures raised by the pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input file does not exist.
    #[error("input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// A column the stage depends on is absent from the table.
    #[error("required column '{0}' not found")]
    MissingColumn(String),

    /// `transform` was asked to encode a column the state was never fit on.
    #[error("{kind} encoder has not been fit for column '{column}'; fit on the training partition first")]
    EncoderNotFit { kind: EncoderKind, column: String },

    /// Split parameters cannot be satisfied by the partition.
    #[error("invalid split: {0}")]
    InvalidSplit(String),
}
