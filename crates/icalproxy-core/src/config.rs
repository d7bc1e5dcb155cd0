//! Per-calendar configuration schema.
//!
//! [`CalendarConfig`] is the serialized form shared by the configuration file
//! and the storage backends. The `compile_*` helpers turn it into the runtime
//! pieces; they are the only place where configuration text is interpreted.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::alarm::{AlarmConfig, AlarmTrigger, AlarmTriggerError};
use crate::filter::{FilterPipeline, FilterRule};
use crate::retention::{RetentionError, RetentionPolicy};

/// Errors found while compiling a calendar configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("calendar has no ical_url")]
    MissingUrl,

    #[error("unknown timezone {0:?}")]
    InvalidTimezone(String),

    #[error(transparent)]
    InvalidAlarm(#[from] AlarmTriggerError),

    #[error(transparent)]
    Retention(#[from] RetentionError),
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// One filter rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub field: String,
    pub operator: String,
    /// A scalar or a list of scalars.
    #[serde(default, alias = "value")]
    pub val: Value,
}

impl RuleConfig {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, val: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            val: val.into(),
        }
    }

    /// The configured values as strings.
    pub fn values(&self) -> Vec<String> {
        match &self.val {
            Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
            other => scalar_to_string(other).into_iter().collect(),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Alarm section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmsConfig {
    #[serde(default)]
    pub clear_existing: bool,
    /// Signed ISO 8601 durations, e.g. `-PT15M`.
    #[serde(default)]
    pub triggers: Vec<String>,
}

impl AlarmsConfig {
    pub fn is_empty(&self) -> bool {
        !self.clear_existing && self.triggers.is_empty()
    }
}

/// Configuration of one proxied calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default)]
    pub ical_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// IANA timezone used by date and time-of-day filter values.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleConfig>,

    #[serde(default, skip_serializing_if = "AlarmsConfig::is_empty")]
    pub alarms: AlarmsConfig,

    /// Transformer sections keyed by registry key.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub transformations: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_missing_days: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_days: Option<u32>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            ical_url: String::new(),
            api_key: None,
            timezone: default_timezone(),
            rules: Vec::new(),
            alarms: AlarmsConfig::default(),
            transformations: Map::new(),
            persist_missing_days: None,
            max_age_days: None,
            window_days: None,
        }
    }
}

impl CalendarConfig {
    pub fn new(ical_url: impl Into<String>) -> Self {
        Self {
            ical_url: ical_url.into(),
            ..Self::default()
        }
    }

    pub fn with_rule(mut self, rule: RuleConfig) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_transformation(mut self, key: impl Into<String>, section: Value) -> Self {
        self.transformations.insert(key.into(), section);
        self
    }

    pub fn compile_timezone(&self) -> Result<Tz, ConfigError> {
        let name = self.timezone.trim();
        if name.is_empty() {
            return Ok(Tz::UTC);
        }
        name.parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }

    pub fn compile_filters(&self) -> FilterPipeline {
        FilterPipeline::new(
            self.rules
                .iter()
                .map(|rule| FilterRule::compile(&rule.field, &rule.operator, &rule.values()))
                .collect(),
        )
    }

    pub fn compile_alarms(&self) -> Result<AlarmConfig, ConfigError> {
        let triggers = self
            .alarms
            .triggers
            .iter()
            .map(|t| AlarmTrigger::parse(t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AlarmConfig {
            clear_existing: self.alarms.clear_existing,
            triggers,
        })
    }

    pub fn retention(&self) -> Result<RetentionPolicy, ConfigError> {
        Ok(RetentionPolicy::from_parts(
            self.persist_missing_days,
            self.window_days,
            self.max_age_days,
        )?)
    }

    /// Checks everything that can be checked without building transformers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ical_url.trim().is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        self.compile_timezone()?;
        self.compile_alarms()?;
        self.retention()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_json_uses_defaults() {
        let config: CalendarConfig =
            serde_json::from_value(json!({"ical_url": "https://example.com/a.ics"})).unwrap();
        assert_eq!(config.timezone, "UTC");
        assert!(config.rules.is_empty());
        assert_eq!(config.retention().unwrap(), RetentionPolicy::Coverage);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn serialization_skips_empty_sections() {
        let config = CalendarConfig::new("https://example.com/a.ics");
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            json!({"ical_url": "https://example.com/a.ics", "timezone": "UTC"})
        );
    }

    #[test]
    fn rule_values_accept_scalars_and_lists() {
        let rule: RuleConfig =
            serde_json::from_value(json!({"field": "summary", "operator": "contains", "value": ["a", 2, true, null]}))
                .unwrap();
        assert_eq!(rule.values(), ["a", "2", "true"]);
        assert_eq!(RuleConfig::new("summary", "equals", "x").values(), ["x"]);
        assert!(RuleConfig::new("summary", "equals", Value::Null).values().is_empty());
    }

    #[test]
    fn invalid_pieces_are_reported() {
        let mut config = CalendarConfig::new("https://example.com/a.ics");
        config.timezone = "Mars/Olympus".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimezone(_))));

        let mut config = CalendarConfig::new("https://example.com/a.ics");
        config.alarms.triggers.push("soon".into());
        assert!(matches!(config.validate(), Err(ConfigError::InvalidAlarm(_))));

        let mut config = CalendarConfig::new("https://example.com/a.ics");
        config.persist_missing_days = Some(2);
        config.window_days = Some(30);
        assert!(matches!(config.validate(), Err(ConfigError::Retention(_))));

        assert!(matches!(CalendarConfig::default().validate(), Err(ConfigError::MissingUrl)));
    }

    #[test]
    fn compiles_timezone_and_alarms() {
        let mut config = CalendarConfig::new("https://example.com/a.ics");
        config.timezone = "Europe/Paris".into();
        config.alarms.triggers = vec!["-PT10M".into()];
        assert_eq!(config.compile_timezone().unwrap(), chrono_tz::Europe::Paris);
        assert_eq!(config.compile_alarms().unwrap().triggers.len(), 1);
    }
}
