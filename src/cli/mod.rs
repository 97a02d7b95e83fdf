//! CLI module - argument parsing and subcommands

mod args;
pub mod prepare;

pub use args::{prepared_output_path, Cli, Commands};
