//! Calendar configuration commands.

use std::path::Path;

use icalproxy_core::CalendarConfig;
use icalproxy_server::CalendarService;
use serde::Serialize;

use super::print_json;
use crate::error::{CliError, CliResult};

#[derive(Serialize)]
struct Listed<'a> {
    name: &'a str,
    source: icalproxy_server::ConfigSource,
    ical_url: &'a str,
}

/// List every calendar with its origin.
pub async fn list(service: &CalendarService) -> CliResult<()> {
    let entries = service.list_calendars().await?;
    let listed: Vec<Listed<'_>> = entries
        .iter()
        .map(|entry| Listed {
            name: &entry.name,
            source: entry.source,
            ical_url: &entry.config.ical_url,
        })
        .collect();
    print_json(&listed)
}

pub async fn get(service: &CalendarService, name: &str) -> CliResult<()> {
    print_json(&service.get_calendar(name).await?)
}

/// Store the configuration read from `file` under `name`.
pub async fn put(service: &CalendarService, name: &str, file: &Path) -> CliResult<()> {
    let config = read_calendar_config(file)?;
    print_json(&service.upsert_calendar(name, config).await?)
}

pub async fn delete(service: &CalendarService, name: &str) -> CliResult<()> {
    service.delete_calendar(name).await?;
    println!("Deleted calendar `{}`.", name);
    Ok(())
}

/// Reads a calendar configuration; `.toml` files are TOML, anything else JSON.
pub fn read_calendar_config(path: &Path) -> CliResult<CalendarConfig> {
    let content =
        std::fs::read_to_string(path).map_err(|e| CliError::input(path, e.to_string()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&content).map_err(|e| CliError::input(path, e.to_string()))
    } else {
        serde_json::from_str(&content).map_err(|e| CliError::input(path, e.to_string()))
    }
}
