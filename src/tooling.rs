//! Tooling
//!
//! The `muster` command line: argument parsing, command dispatch, and report
//! rendering.

pub mod cli;
pub mod format;

pub use cli::{Cli, CliContext, CommandOutput, Commands};
