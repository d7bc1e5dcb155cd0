//! Configuration commands.

use std::path::Path;

use icalproxy_core::TransformerRegistry;
use icalproxy_server::{ProxyCalendar, ProxyConfig};
use icalproxy_store::StorageKind;

use crate::error::CliResult;

/// Show the configuration file path.
pub fn path(explicit: Option<&Path>) -> CliResult<()> {
    match explicit {
        Some(path) => println!("config: {}", path.display()),
        None => println!("config: {}", ProxyConfig::default_path().display()),
    }
    Ok(())
}

/// Validate the configuration: the storage string and every static calendar.
pub fn validate(config: &ProxyConfig, storage: Option<&str>) -> CliResult<()> {
    let kind = StorageKind::parse(&config.storage_uri(storage))?;
    println!("storage: {}", kind);

    let registry = TransformerRegistry::builtin();
    for (name, calendar) in &config.calendars {
        ProxyCalendar::build(name.as_str(), calendar.clone(), &registry)?;
        for key in calendar
            .transformations
            .keys()
            .filter(|key| !registry.contains(key))
        {
            println!("warning: calendar `{}` uses unknown transformation `{}`", name, key);
        }
    }

    println!("Configuration is valid ({} calendars).", config.calendars.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use icalproxy_core::CalendarConfig;
    use icalproxy_server::ServerError;

    #[test]
    fn validates_calendars_and_storage() {
        let config = ProxyConfig::default()
            .with_storage("json:///tmp/icalproxy")
            .with_calendar("work", CalendarConfig::new("https://example.com/work.ics"));
        validate(&config, None).unwrap();

        assert!(matches!(
            validate(&config, Some("redis://localhost")),
            Err(CliError::Storage(_))
        ));

        let mut broken = CalendarConfig::new("https://example.com/home.ics");
        broken.persist_missing_days = Some(2);
        broken.window_days = Some(30);
        let config = config.with_calendar("home", broken);
        assert!(matches!(
            validate(&config, None),
            Err(CliError::Server(ServerError::Calendar { .. }))
        ));
    }
}
