//! Per-calendar commands: render, sync, events and preview.

use std::collections::BTreeMap;
use std::path::Path;

use icalproxy_server::{CalendarService, EventView};
use tracing::info;

use super::print_json;
use crate::error::{CliError, CliResult};

/// Render the proxied calendar to stdout or `output`.
pub async fn render(
    service: &CalendarService,
    name: &str,
    key: Option<&str>,
    output: Option<&Path>,
) -> CliResult<()> {
    let text = service.render(name, key).await?;
    match output {
        Some(path) => {
            std::fs::write(path, &text)?;
            info!(calendar = %name, path = %path.display(), "wrote calendar");
        }
        None => print!("{}", text),
    }
    Ok(())
}

/// Sync the named calendars, or every calendar when `names` is empty.
///
/// A failing calendar does not stop the others; the command fails afterwards.
pub async fn sync(service: &CalendarService, names: &[String]) -> CliResult<()> {
    let names: Vec<String> = if names.is_empty() {
        service
            .list_calendars()
            .await?
            .into_iter()
            .map(|entry| entry.name)
            .collect()
    } else {
        names.to_vec()
    };

    let total = names.len();
    let mut reports = BTreeMap::new();
    let mut failed = 0;
    for name in names {
        match service.sync(&name).await {
            Ok(report) => {
                reports.insert(name, report);
            }
            Err(e) => {
                eprintln!("error: {}: {}", name, e);
                failed += 1;
            }
        }
    }

    print_json(&reports)?;
    if failed > 0 {
        return Err(CliError::SyncFailed { failed, total });
    }
    Ok(())
}

/// Print one event view as JSON.
pub async fn events(service: &CalendarService, name: &str, view: EventView) -> CliResult<()> {
    let events = service.events(name, view).await?;
    print_json(&events)
}

/// Print the events a render would emit as JSON.
pub async fn preview(service: &CalendarService, name: &str, key: Option<&str>) -> CliResult<()> {
    let events = service.preview(name, key).await?;
    print_json(&events)
}
