//! Persisted event records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::{parse_iso8601, to_iso8601};

/// The persisted state of one calendar: uid to record.
///
/// A `BTreeMap` keeps saves and reconstructed unions in a stable order.
pub type CalendarStore = BTreeMap<String, EventRecord>;

/// One persisted event.
///
/// Timestamps are stored as ISO 8601 UTC strings; unreadable values load as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub uid: String,
    /// The event serialized as a single VEVENT block.
    pub raw: String,
    #[serde(default, with = "iso8601_opt")]
    pub dtstart: Option<DateTime<Utc>>,
    #[serde(default, with = "iso8601_opt")]
    pub dtend: Option<DateTime<Utc>>,
    #[serde(default, with = "iso8601_opt")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default, with = "iso8601_opt")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl EventRecord {
    pub fn new(uid: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            raw: raw.into(),
            dtstart: None,
            dtend: None,
            first_seen: None,
            last_seen: None,
        }
    }

    pub fn with_times(mut self, dtstart: Option<DateTime<Utc>>, dtend: Option<DateTime<Utc>>) -> Self {
        self.dtstart = dtstart;
        self.dtend = dtend;
        self
    }

    pub fn with_seen(mut self, first_seen: DateTime<Utc>, last_seen: DateTime<Utc>) -> Self {
        self.first_seen = Some(first_seen);
        self.last_seen = Some(last_seen);
        self
    }

    /// End time used by retention decisions: `dtend`, else `dtstart`.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.dtend.or(self.dtstart)
    }

    /// Builds a record from string columns as stored by the SQL backends.
    pub fn from_columns(
        uid: String,
        raw: Option<String>,
        dtstart: Option<&str>,
        dtend: Option<&str>,
        first_seen: Option<&str>,
        last_seen: Option<&str>,
    ) -> Self {
        Self {
            uid,
            raw: raw.unwrap_or_default(),
            dtstart: dtstart.and_then(parse_iso8601),
            dtend: dtend.and_then(parse_iso8601),
            first_seen: first_seen.and_then(parse_iso8601),
            last_seen: last_seen.and_then(parse_iso8601),
        }
    }

    /// The four timestamp columns as ISO 8601 strings.
    pub fn time_columns(&self) -> [Option<String>; 4] {
        [self.dtstart, self.dtend, self.first_seen, self.last_seen].map(|t| t.map(to_iso8601))
    }
}

mod iso8601_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::time::{parse_iso8601, to_iso8601};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&to_iso8601(*dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?;
        Ok(text.as_deref().and_then(parse_iso8601))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn end_time_falls_back_to_start() {
        let start = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let record = EventRecord::new("a", "raw").with_times(Some(start), None);
        assert_eq!(record.end_time(), Some(start));
        assert_eq!(EventRecord::new("b", "raw").end_time(), None);
    }

    #[test]
    fn json_shape() {
        let t = Utc.with_ymd_and_hms(2025, 2, 5, 10, 0, 0).unwrap();
        let record = EventRecord::new("u1", "BEGIN:VEVENT\r\nEND:VEVENT")
            .with_times(Some(t), None)
            .with_seen(t, t);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["dtstart"], "2025-02-05T10:00:00Z");
        assert!(json["dtend"].is_null());

        let back: EventRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn tolerant_timestamps() {
        let record: EventRecord = serde_json::from_str(
            r#"{"uid":"x","raw":"r","dtstart":"garbage","dtend":"","first_seen":"2025-02-05T10:00:00+01:00"}"#,
        )
        .unwrap();
        assert_eq!(record.dtstart, None);
        assert_eq!(record.dtend, None);
        assert_eq!(record.first_seen, Some(Utc.with_ymd_and_hms(2025, 2, 5, 9, 0, 0).unwrap()));
        assert_eq!(record.last_seen, None);
    }

    #[test]
    fn column_round_trip() {
        let t = Utc.with_ymd_and_hms(2025, 2, 5, 10, 0, 0).unwrap();
        let record = EventRecord::new("u1", "raw").with_times(Some(t), Some(t)).with_seen(t, t);
        let [s, e, f, l] = record.time_columns();
        let back = EventRecord::from_columns(
            "u1".into(),
            Some("raw".into()),
            s.as_deref(),
            e.as_deref(),
            f.as_deref(),
            l.as_deref(),
        );
        assert_eq!(back, record);
    }
}
