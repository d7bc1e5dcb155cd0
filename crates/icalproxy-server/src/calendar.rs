//! A calendar configuration compiled into its pipelines.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use icalproxy_core::{
    AlarmConfig, CalendarConfig, ConfigError, Event, FilterPipeline, RetentionPolicy, TransformPipeline,
    TransformerRegistry,
};
use tracing::debug;

use crate::error::{ServerError, ServerResult};

/// Everything needed to turn a reconciled event set into output.
#[derive(Debug)]
pub struct ProxyCalendar {
    name: String,
    config: CalendarConfig,
    timezone: Tz,
    filters: FilterPipeline,
    alarms: AlarmConfig,
    transforms: TransformPipeline,
    retention: RetentionPolicy,
}

impl ProxyCalendar {
    /// Validates and compiles `config`.
    pub fn build(
        name: impl Into<String>,
        config: CalendarConfig,
        registry: &TransformerRegistry,
    ) -> ServerResult<Self> {
        let name = name.into();
        let (timezone, alarms, retention) =
            compile(&config).map_err(|e| ServerError::calendar(&name, e))?;
        let filters = config.compile_filters();
        let transforms = registry.build(&config.transformations);
        debug!(
            calendar = %name,
            rules = filters.rules().len(),
            transformers = ?transforms.names(),
            "built calendar"
        );
        Ok(Self {
            name,
            config,
            timezone,
            filters,
            alarms,
            transforms,
            retention,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage key for the calendar's reconciled state.
    pub fn storage_key(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    pub fn feed_url(&self) -> &str {
        &self.config.ical_url
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    /// Checks a caller-supplied access key. No key supplied means no check.
    pub fn authorize(&self, key: Option<&str>) -> ServerResult<()> {
        match key {
            Some(key) if self.config.api_key.as_deref() != Some(key) => {
                Err(ServerError::forbidden(&self.name))
            }
            _ => Ok(()),
        }
    }

    /// Filters, then injects alarms into and transforms every surviving event.
    pub fn prepare(&self, events: Vec<Event>, now: DateTime<Utc>) -> Vec<Event> {
        events
            .into_iter()
            .filter(|event| self.filters.matches(event, &self.timezone, now))
            .map(|mut event| {
                self.alarms.apply(&mut event);
                self.transforms.apply(&mut event);
                event
            })
            .collect()
    }
}

fn compile(config: &CalendarConfig) -> Result<(Tz, AlarmConfig, RetentionPolicy), ConfigError> {
    config.validate()?;
    Ok((
        config.compile_timezone()?,
        config.compile_alarms()?,
        config.retention()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use icalproxy_core::{EventStatus, RuleConfig};
    use serde_json::json;

    fn calendar(config: CalendarConfig) -> ProxyCalendar {
        ProxyCalendar::build("work", config, &TransformerRegistry::builtin()).unwrap()
    }

    #[test]
    fn prepare_filters_then_alarms_then_transforms() {
        let mut config = CalendarConfig::new("https://example.com/a.ics")
            .with_rule(RuleConfig::new("status", "not-equals", "CANCELLED"))
            .with_transformation("uppercase_summary", json!(true));
        config.alarms.clear_existing = true;
        config.alarms.triggers = vec!["-PT15M".to_string()];
        let calendar = calendar(config);

        let events = vec![
            Event::new("1").with_summary("Standup"),
            Event::new("2").with_summary("Gone").with_status(EventStatus::Cancelled),
        ];
        let out = calendar.prepare(events, Utc::now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].summary.as_deref(), Some("STANDUP"));
        assert_eq!(out[0].alarms.len(), 1);
        // Alarms carry the summary as it was before transformers ran.
        assert_eq!(out[0].alarms[0].description.as_deref(), Some("Standup"));
        assert_eq!(out[0].alarms[0].trigger, "-PT15M");
    }

    #[test]
    fn authorize() {
        let mut config = CalendarConfig::new("https://example.com/a.ics");
        config.api_key = Some("k".to_string());
        let calendar = calendar(config);
        assert!(calendar.authorize(None).is_ok());
        assert!(calendar.authorize(Some("k")).is_ok());
        assert!(matches!(
            calendar.authorize(Some("x")),
            Err(ServerError::Forbidden { .. })
        ));
    }

    #[test]
    fn build_reports_configuration_errors() {
        let mut config = CalendarConfig::new("https://example.com/a.ics");
        config.timezone = "Mars/Olympus".to_string();
        let err = ProxyCalendar::build("work", config, &TransformerRegistry::builtin()).unwrap_err();
        assert!(matches!(
            err,
            ServerError::Calendar {
                source: ConfigError::InvalidTimezone(_),
                ..
            }
        ));

        let err = ProxyCalendar::build("x", CalendarConfig::default(), &TransformerRegistry::builtin())
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Calendar {
                source: ConfigError::MissingUrl,
                ..
            }
        ));
    }

    #[test]
    fn retention_shape_is_compiled() {
        let mut config = CalendarConfig::new("https://example.com/a.ics");
        config.persist_missing_days = Some(2);
        assert_eq!(calendar(config).retention(), &RetentionPolicy::MissingDays(2));
    }
}
