//! Report module - run summary and on-disk exports

pub mod export;
pub mod summary;

pub use export::*;
pub use summary::*;
