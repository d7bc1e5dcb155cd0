//! Command implementations.

pub mod calendar;
pub mod calendars;
pub mod config;

use serde::Serialize;

use crate::error::CliResult;

/// Pretty-prints `value` as JSON on stdout.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
