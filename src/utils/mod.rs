//! Console output helpers

pub mod progress;
pub mod styling;

pub use progress::*;
pub use styling::*;
