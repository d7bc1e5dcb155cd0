//! Reading iCalendar text with the `icalendar` crate's parser.

use chrono::{NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use icalendar::parser::{Component, Property, read_calendar, unfold};
use tracing::debug;

use icalproxy_core::{
    Alarm, CodecError, CodecResult, Event, EventStatus, EventTime, GeoPoint, RawProperty,
};

/// Parses a complete feed. Every VEVENT is returned, wherever it is nested.
pub fn parse_calendar(content: &str) -> CodecResult<Vec<Event>> {
    if !content.contains("BEGIN:VCALENDAR") {
        return Err(CodecError::Parse("missing BEGIN:VCALENDAR".to_string()));
    }
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| CodecError::Parse(e.to_string()))?;

    let mut events = Vec::new();
    collect_events(&calendar.components, &mut events);
    Ok(events)
}

fn collect_events(components: &[Component<'_>], out: &mut Vec<Event>) {
    for component in components {
        if component.name.as_ref().eq_ignore_ascii_case("VEVENT") {
            out.push(parse_event(component));
        } else {
            collect_events(&component.components, out);
        }
    }
}

fn parse_event(vevent: &Component<'_>) -> Event {
    let mut event = Event::default();

    for prop in &vevent.properties {
        let name = prop.name.as_ref().to_ascii_uppercase();
        let value = prop.val.as_ref();
        match name.as_str() {
            "UID" => event.uid = Some(value.trim().to_string()),
            "SUMMARY" => event.summary = Some(unescape_text(value)),
            "DESCRIPTION" => event.description = Some(unescape_text(value)),
            "LOCATION" => event.location = Some(unescape_text(value)),
            "DTSTART" | "DTEND" => match parse_time(prop) {
                Some(time) if name == "DTSTART" => event.start = Some(time),
                Some(time) => event.end = Some(time),
                None => {
                    debug!(property = %name, value = %value, "unreadable time, keeping verbatim");
                    event.extra.push(raw_property(prop));
                }
            },
            "GEO" => match parse_geo(value) {
                Some(geo) => event.geo = Some(geo),
                None => event.extra.push(raw_property(prop)),
            },
            "STATUS" => match EventStatus::parse(value) {
                EventStatus::Unspecified => event.extra.push(raw_property(prop)),
                status => event.status = status,
            },
            _ => event.extra.push(raw_property(prop)),
        }
    }

    event.alarms = vevent
        .components
        .iter()
        .filter(|c| c.name.as_ref().eq_ignore_ascii_case("VALARM"))
        .map(parse_alarm)
        .collect();

    event
}

fn parse_alarm(valarm: &Component<'_>) -> Alarm {
    let mut alarm = Alarm {
        action: String::new(),
        trigger: String::new(),
        description: None,
        extra: Vec::new(),
    };
    for prop in &valarm.properties {
        match prop.name.as_ref().to_ascii_uppercase().as_str() {
            "ACTION" => alarm.action = prop.val.as_ref().trim().to_string(),
            // A parameterised trigger (RELATED=END, VALUE=DATE-TIME) is kept whole.
            "TRIGGER" if prop.params.is_empty() => {
                alarm.trigger = prop.val.as_ref().trim().to_string()
            }
            "DESCRIPTION" => alarm.description = Some(unescape_text(prop.val.as_ref())),
            _ => alarm.extra.push(raw_property(prop)),
        }
    }
    if alarm.action.is_empty() {
        alarm.action = "DISPLAY".to_string();
    }
    alarm
}

fn param<'a>(prop: &'a Property<'_>, key: &str) -> Option<&'a str> {
    prop.params
        .iter()
        .find(|p| p.key.as_ref().eq_ignore_ascii_case(key))
        .and_then(|p| p.val.as_ref())
        .map(|v| v.as_ref().trim_matches('"'))
}

/// Reads DTSTART/DTEND.
///
/// DATE values stay all-day. UTC (`Z`) values are taken as-is, TZID values are
/// resolved through the IANA database, and floating or unknown-zone values are
/// read as UTC.
fn parse_time(prop: &Property<'_>) -> Option<EventTime> {
    let value = prop.val.as_ref().trim();
    let is_date = param(prop, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || value.len() == 8;
    if is_date {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .map(EventTime::from_date);
    }

    if let Some(utc) = value.strip_suffix('Z') {
        return parse_naive(utc).map(|dt| EventTime::from_utc(dt.and_utc()));
    }

    let naive = parse_naive(value)?;
    let Some(tzid) = param(prop, "TZID") else {
        return Some(EventTime::from_utc(naive.and_utc()));
    };
    match tzid.trim_start_matches('/').parse::<Tz>() {
        Ok(tz) => tz
            .from_local_datetime(&naive)
            .earliest()
            .map(EventTime::from_local)
            .or_else(|| Some(EventTime::from_utc(naive.and_utc()))),
        Err(_) => {
            debug!(tzid = %tzid, "unknown TZID, reading time as UTC");
            Some(EventTime::from_utc(naive.and_utc()))
        }
    }
}

fn parse_naive(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()
}

fn parse_geo(value: &str) -> Option<GeoPoint> {
    let (lat, lon) = value.split_once(';')?;
    Some(GeoPoint::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

fn raw_property(prop: &Property<'_>) -> RawProperty {
    RawProperty {
        name: prop.name.as_ref().to_ascii_uppercase(),
        params: prop
            .params
            .iter()
            .map(|p| (p.key.to_string(), p.val.as_ref().map(|v| v.to_string())))
            .collect(),
        value: prop.val.to_string(),
    }
}

/// Reverses RFC 5545 TEXT escaping.
pub(crate) fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
