//! The calendar event model shared by the codec, the filters, the transformers
//! and the reconciliation engine.
//!
//! - [`Event`]: one VEVENT with the fields the proxy interprets, plus every
//!   other property kept verbatim so it can be written back unchanged
//! - [`EventStatus`]: the STATUS property
//! - [`Alarm`]: a VALARM attached to an event
//! - [`EventSource`] / [`SourcedEvent`]: provenance of an event in a reconciled union
//! - [`EventSummary`]: flattened, serializable view used by the service layer

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::{EventTime, to_iso8601};

/// The STATUS of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
    /// No STATUS property, or a value the proxy does not know.
    #[default]
    Unspecified,
}

impl EventStatus {
    /// Parses an iCalendar STATUS value, case-insensitively.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "CONFIRMED" => Self::Confirmed,
            "TENTATIVE" => Self::Tentative,
            "CANCELLED" | "CANCELED" => Self::Cancelled,
            _ => Self::Unspecified,
        }
    }

    /// The iCalendar spelling, `None` for [`EventStatus::Unspecified`].
    pub fn as_ics_str(&self) -> Option<&'static str> {
        match self {
            Self::Confirmed => Some("CONFIRMED"),
            Self::Tentative => Some("TENTATIVE"),
            Self::Cancelled => Some("CANCELLED"),
            Self::Unspecified => None,
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ics_str().unwrap_or(""))
    }
}

/// A GEO coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A property kept exactly as it was read.
///
/// `value` is the raw (still escaped) property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProperty {
    pub name: String,
    /// Parameters in source order; a parameter without a value has `None`.
    #[serde(default)]
    pub params: Vec<(String, Option<String>)>,
    pub value: String,
}

impl RawProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), Some(value.into())));
        self
    }
}

/// A VALARM component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    /// ACTION, usually `DISPLAY`.
    pub action: String,
    /// Raw TRIGGER value, e.g. `-PT15M`. Empty when a parameterised TRIGGER sits in `extra`.
    pub trigger: String,
    /// DESCRIPTION (unescaped).
    pub description: Option<String>,
    /// Other alarm properties, verbatim.
    #[serde(default)]
    pub extra: Vec<RawProperty>,
}

impl Alarm {
    /// A DISPLAY alarm with the given description and trigger value.
    pub fn display(description: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            action: "DISPLAY".to_string(),
            trigger: trigger.into(),
            description: Some(description.into()),
            extra: Vec::new(),
        }
    }
}

/// The free-text fields filters and transformers read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    Summary,
    Description,
    Location,
}

impl TextField {
    /// Parses a configuration field name; unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "summary" => Some(Self::Summary),
            "description" => Some(Self::Description),
            "location" => Some(Self::Location),
            _ => None,
        }
    }
}

/// One calendar event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// UID; events without a usable one are never persisted.
    pub uid: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub geo: Option<GeoPoint>,
    pub status: EventStatus,
    pub alarms: Vec<Alarm>,
    /// Properties the proxy does not interpret, in source order.
    pub extra: Vec<RawProperty>,
}

impl Event {
    /// Creates an event with the given UID.
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            ..Default::default()
        }
    }

    pub fn with_start(mut self, start: EventTime) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_end(mut self, end: EventTime) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    /// The UID if it is present and not blank.
    pub fn persistable_uid(&self) -> Option<&str> {
        self.uid.as_deref().filter(|uid| !uid.trim().is_empty())
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == EventStatus::Cancelled
    }

    /// End instant, falling back to the start when the event has no end.
    pub fn end_or_start(&self) -> Option<DateTime<Utc>> {
        self.end
            .or(self.start)
            .map(|time| time.to_utc_datetime())
    }

    /// The value of a text field, empty when unset.
    pub fn text(&self, field: TextField) -> &str {
        let value = match field {
            TextField::Summary => &self.summary,
            TextField::Description => &self.description,
            TextField::Location => &self.location,
        };
        value.as_deref().unwrap_or("")
    }

    pub fn set_text(&mut self, field: TextField, value: impl Into<String>) {
        let slot = match field {
            TextField::Summary => &mut self.summary,
            TextField::Description => &mut self.description,
            TextField::Location => &mut self.location,
        };
        *slot = Some(value.into());
    }
}

/// Where an event in a reconciled union came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Present in the feed fetched for this pass.
    Live,
    /// Missing from the feed, reconstructed from storage.
    Persisted,
}

/// An event tagged with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedEvent {
    pub event: Event,
    pub source: EventSource,
}

impl SourcedEvent {
    pub fn live(event: Event) -> Self {
        Self {
            event,
            source: EventSource::Live,
        }
    }

    pub fn persisted(event: Event) -> Self {
        Self {
            event,
            source: EventSource::Persisted,
        }
    }
}

/// Flattened, JSON-friendly view of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    pub uid: Option<String>,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub dtstart: Option<String>,
    pub dtend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<EventSource>,
}

impl EventSummary {
    pub fn from_event(event: &Event, source: Option<EventSource>) -> Self {
        Self {
            uid: event.uid.clone(),
            summary: event.text(TextField::Summary).to_string(),
            description: event.text(TextField::Description).to_string(),
            location: event.text(TextField::Location).to_string(),
            dtstart: event.start.map(|t| to_iso8601(t.to_utc_datetime())),
            dtend: event.end.map(|t| to_iso8601(t.to_utc_datetime())),
            source,
        }
    }
}

impl From<&SourcedEvent> for EventSummary {
    fn from(sourced: &SourcedEvent) -> Self {
        Self::from_event(&sourced.event, Some(sourced.source))
    }
}
