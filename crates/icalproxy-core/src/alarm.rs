//! Alarm injection.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;

use crate::event::{Alarm, Event, TextField};

#[derive(Debug, Error)]
#[error("invalid alarm trigger {trigger:?}: {reason}")]
pub struct AlarmTriggerError {
    pub trigger: String,
    pub reason: String,
}

/// A signed ISO 8601 duration relative to the event start, e.g. `-PT15M`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmTrigger {
    offset: Duration,
    text: String,
}

impl AlarmTrigger {
    pub fn parse(text: &str) -> Result<Self, AlarmTriggerError> {
        let text = text.trim().to_ascii_uppercase();
        let (negative, unsigned) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(&text)),
        };

        let parsed = iso8601::duration(unsigned).map_err(|reason| AlarmTriggerError {
            trigger: text.clone(),
            reason,
        })?;
        let std_duration: std::time::Duration = parsed.into();
        let magnitude = Duration::from_std(std_duration).map_err(|e| AlarmTriggerError {
            trigger: text.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            offset: if negative { -magnitude } else { magnitude },
            text: if negative {
                format!("-{unsigned}")
            } else {
                unsigned.to_string()
            },
        })
    }

    /// Offset from the event start; negative means before.
    pub fn offset(&self) -> Duration {
        self.offset
    }

    /// The TRIGGER property value.
    pub fn as_ics(&self) -> &str {
        &self.text
    }
}

impl FromStr for AlarmTrigger {
    type Err = AlarmTriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AlarmTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Alarm settings of one calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlarmConfig {
    /// Drop every alarm the feed shipped before adding ours.
    pub clear_existing: bool,
    pub triggers: Vec<AlarmTrigger>,
}

impl AlarmConfig {
    pub fn is_noop(&self) -> bool {
        !self.clear_existing && self.triggers.is_empty()
    }

    /// Clears and/or appends one DISPLAY alarm per trigger, described by the summary.
    pub fn apply(&self, event: &mut Event) {
        if self.clear_existing {
            event.alarms.clear();
        }
        let description = event.text(TextField::Summary).to_string();
        event.alarms.extend(
            self.triggers
                .iter()
                .map(|trigger| Alarm::display(description.clone(), trigger.as_ics())),
        );
    }
}
