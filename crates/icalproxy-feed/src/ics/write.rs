//! Writing iCalendar text.
//!
//! Times are written in UTC (`...Z`) or DATE form, text is escaped and every
//! content line is folded at 75 octets.

use icalproxy_core::{Alarm, Event, EventTime, RawProperty};

const MAX_LINE_OCTETS: usize = 75;

pub(crate) const PRODID: &str = "-//icalproxy//icalproxy//EN";

/// Writes a whole VCALENDAR around `events`.
pub fn write_calendar(events: &[Event]) -> String {
    let mut out = String::new();
    push_line(&mut out, "BEGIN:VCALENDAR");
    push_line(&mut out, "VERSION:2.0");
    push_line(&mut out, &format!("PRODID:{}", PRODID));
    push_line(&mut out, "CALSCALE:GREGORIAN");
    for event in events {
        write_event(&mut out, event);
    }
    push_line(&mut out, "END:VCALENDAR");
    out
}

/// Appends one VEVENT block to `out`.
pub fn write_event(out: &mut String, event: &Event) {
    push_line(out, "BEGIN:VEVENT");
    if let Some(uid) = &event.uid {
        push_property(out, "UID", &[], uid);
    }
    if let Some(start) = &event.start {
        push_time(out, "DTSTART", start);
    }
    if let Some(end) = &event.end {
        push_time(out, "DTEND", end);
    }
    if let Some(summary) = &event.summary {
        push_property(out, "SUMMARY", &[], &escape_text(summary));
    }
    if let Some(description) = &event.description {
        push_property(out, "DESCRIPTION", &[], &escape_text(description));
    }
    if let Some(location) = &event.location {
        push_property(out, "LOCATION", &[], &escape_text(location));
    }
    if let Some(geo) = &event.geo {
        push_property(out, "GEO", &[], &format!("{};{}", geo.lat, geo.lon));
    }
    if let Some(status) = event.status.as_ics_str() {
        push_property(out, "STATUS", &[], status);
    }
    for prop in &event.extra {
        push_raw(out, prop);
    }
    for alarm in &event.alarms {
        write_alarm(out, alarm);
    }
    push_line(out, "END:VEVENT");
}

fn write_alarm(out: &mut String, alarm: &Alarm) {
    push_line(out, "BEGIN:VALARM");
    push_property(out, "ACTION", &[], &alarm.action);
    if !alarm.trigger.is_empty() {
        push_property(out, "TRIGGER", &[], &alarm.trigger);
    }
    if let Some(description) = &alarm.description {
        push_property(out, "DESCRIPTION", &[], &escape_text(description));
    }
    for prop in &alarm.extra {
        push_raw(out, prop);
    }
    push_line(out, "END:VALARM");
}

fn push_time(out: &mut String, name: &str, time: &EventTime) {
    match time {
        EventTime::DateTime(dt) => {
            push_property(out, name, &[], &dt.format("%Y%m%dT%H%M%SZ").to_string())
        }
        EventTime::AllDay(date) => push_property(
            out,
            name,
            &[("VALUE".to_string(), Some("DATE".to_string()))],
            &date.format("%Y%m%d").to_string(),
        ),
    }
}

fn push_raw(out: &mut String, prop: &RawProperty) {
    push_property(out, &prop.name, &prop.params, &prop.value);
}

fn push_property(out: &mut String, name: &str, params: &[(String, Option<String>)], value: &str) {
    let mut line = String::from(name);
    for (key, val) in params {
        line.push(';');
        line.push_str(key);
        if let Some(val) = val {
            line.push('=');
            line.push_str(&quote_param(val));
        }
    }
    line.push(':');
    line.push_str(value);
    push_line(out, &line);
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(&fold_line(line));
    out.push_str("\r\n");
}

fn quote_param(value: &str) -> String {
    let needs_quotes = value.contains([':', ';', ',']) && !value.starts_with('"');
    if needs_quotes {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

/// Applies RFC 5545 TEXT escaping.
pub(crate) fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Splits a content line into 75-octet chunks joined by CRLF + space,
/// never inside a UTF-8 sequence.
pub(crate) fn fold_line(line: &str) -> String {
    if line.len() <= MAX_LINE_OCTETS {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut width = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(c);
        width += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use icalproxy_core::{EventStatus, GeoPoint};

    #[test]
    fn writes_event_in_order() {
        let event = Event::new("abc")
            .with_start(EventTime::from_utc(Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()))
            .with_end(EventTime::from_date(NaiveDate::from_ymd_opt(2025, 3, 11).unwrap()))
            .with_summary("Sync; team, A")
            .with_status(EventStatus::Tentative);
        let mut out = String::new();
        write_event(&mut out, &event);
        assert_eq!(
            out,
            "BEGIN:VEVENT\r\n\
UID:abc\r\n\
DTSTART:20250310T080000Z\r\n\
DTEND;VALUE=DATE:20250311\r\n\
SUMMARY:Sync\\; team\\, A\r\n\
STATUS:TENTATIVE\r\n\
END:VEVENT\r\n"
        );
    }

    #[test]
    fn writes_extras_geo_and_alarms() {
        let mut event = Event::new("1");
        event.geo = Some(GeoPoint::new(1.5, -2.25));
        event
            .extra
            .push(RawProperty::new("ATTENDEE", "mailto:a@example.com").with_param("CN", "Doe, Jane"));
        event.alarms.push(Alarm::display("Sync", "-PT15M"));

        let mut out = String::new();
        write_event(&mut out, &event);
        assert!(out.contains("GEO:1.5;-2.25\r\n"));
        assert!(out.contains("ATTENDEE;CN=\"Doe, Jane\":mailto:a@example.com\r\n"));
        assert!(out.contains(
            "BEGIN:VALARM\r\nACTION:DISPLAY\r\nTRIGGER:-PT15M\r\nDESCRIPTION:Sync\r\nEND:VALARM\r\n"
        ));
    }

    #[test]
    fn calendar_envelope() {
        let out = write_calendar(&[]);
        assert!(out.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
        assert!(out.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn folds_long_lines() {
        let line = format!("SUMMARY:{}", "é".repeat(60));
        let folded = fold_line(&line);
        for part in folded.split("\r\n") {
            assert!(part.len() <= MAX_LINE_OCTETS);
        }
        assert_eq!(folded.replace("\r\n ", ""), line);
        assert_eq!(fold_line("SHORT:x"), "SHORT:x");
    }

    #[test]
    fn escape() {
        assert_eq!(escape_text("a\\b;c,d\r\ne"), "a\\\\b\\;c\\,d\\ne");
    }
}
