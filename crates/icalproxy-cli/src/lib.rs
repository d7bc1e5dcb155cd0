//! Command-line front end for the calendar proxy.
//!
//! This crate provides the `icalproxy` binary.

pub mod cli;
pub mod commands;
pub mod error;

pub use cli::Cli;
pub use error::{CliError, CliResult};
