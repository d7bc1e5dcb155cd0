//! Event time values and the day arithmetic used by retention decisions.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// The start or end of a calendar event.
///
/// Timed values are normalized to UTC when parsed; all-day values keep their
/// calendar date so they can be written back in DATE form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A specific instant.
    DateTime(DateTime<Utc>),
    /// A whole day, without a time component.
    AllDay(NaiveDate),
}

impl EventTime {
    /// Creates a timed value from a UTC instant.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }

    /// Creates a timed value from an instant in any timezone.
    pub fn from_local<Tz: TimeZone>(dt: DateTime<Tz>) -> Self {
        Self::DateTime(dt.with_timezone(&Utc))
    }

    /// Creates an all-day value.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::AllDay(date)
    }

    /// Returns `true` for all-day values.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// The instant this value denotes; all-day values map to midnight UTC.
    pub fn to_utc_datetime(&self) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => date.and_time(NaiveTime::MIN).and_utc(),
        }
    }

    /// The calendar date of this value as seen from `tz`.
    pub fn date_in<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        match self {
            Self::DateTime(dt) => dt.with_timezone(tz).date_naive(),
            Self::AllDay(date) => *date,
        }
    }

    /// The wall-clock time of this value as seen from `tz`; midnight for all-day values.
    pub fn time_in<Tz: TimeZone>(&self, tz: &Tz) -> NaiveTime {
        match self {
            Self::DateTime(dt) => dt.with_timezone(tz).time(),
            Self::AllDay(_) => NaiveTime::MIN,
        }
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_utc_datetime().cmp(&other.to_utc_datetime())
    }
}

/// Fractional days elapsed from `then` to `now` (negative when `then` is in the future).
pub fn days_since(now: DateTime<Utc>, then: DateTime<Utc>) -> f64 {
    (now - then).num_seconds() as f64 / SECONDS_PER_DAY
}

/// `now` minus a whole number of days, clamped to the earliest representable instant.
pub fn days_before(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(days))
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// ISO-8601 rendering used for persisted timestamps (`2025-02-05T10:00:00Z`).
pub fn to_iso8601(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses a persisted ISO-8601 timestamp; blank or malformed input yields `None`.
pub fn parse_iso8601(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
