//! Pipeline module - cleaning, imputation, feature generation and splitting

pub mod align;
pub mod cleaning;
pub mod config;
pub mod encoders;
pub mod error;
pub mod features;
pub mod finisher;
pub mod imputer;
pub mod loader;
pub mod preprocess;
pub mod schema;
pub mod split;
pub mod values;

pub use align::{align_to_features, AlignedFrame};
pub use config::{PipelineMode, PreprocessConfig};
pub use encoders::{
    ColumnEncoding, Encoder, EncoderBank, EncoderKind, EncoderState, FittedEncoders,
};
pub use error::PipelineError;
pub use features::{FeatureGenerator, FeatureOptions, FittedFeatures};
pub use finisher::{FinishReport, MissingValueFinisher};
pub use imputer::{
    click_log_rules, infer, ConsensusRule, DeterministicImputer, ImputeReport, InferenceRule,
    RowFilter, Rule, DEFAULT_MAX_PASSES,
};
pub use loader::*;
pub use preprocess::{FoldSummary, PreprocessOutput, Preprocessor, RunStats};
pub use split::{
    emit_folds, split_xy, stratified_holdout, stratified_kfold, FinalSplit, Fold, FoldData,
    Holdout, NoopSink, SplitSink, DEFAULT_HOLDOUT_FRACTION, DEFAULT_N_FOLDS, DEFAULT_SEED,
};
