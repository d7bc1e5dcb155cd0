//! The iCalendar (RFC 5545) codec.
//!
//! Parsing goes through the `icalendar` crate's parser; writing is done by
//! hand so extra properties and parameters come back out as they went in.
//! VTIMEZONE blocks are not reproduced since every time is written in UTC.

mod parse;
mod write;

use icalproxy_core::{CodecError, CodecResult, Event, EventCodec};

pub use parse::parse_calendar;
pub use write::{write_calendar, write_event};

/// [`EventCodec`] for iCalendar text.
#[derive(Debug, Clone, Copy, Default)]
pub struct IcsCodec;

impl IcsCodec {
    pub fn new() -> Self {
        Self
    }
}

impl EventCodec for IcsCodec {
    fn parse_feed(&self, text: &str) -> CodecResult<Vec<Event>> {
        parse_calendar(text)
    }

    /// A stored body is a bare VEVENT block.
    fn encode_event(&self, event: &Event) -> CodecResult<String> {
        let mut out = String::new();
        write_event(&mut out, event);
        Ok(out)
    }

    fn decode_event(&self, raw: &str) -> CodecResult<Event> {
        if !raw.contains("BEGIN:VEVENT") {
            return Err(CodecError::Decode("no VEVENT block".to_string()));
        }
        let wrapped = format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\n{}\r\nEND:VCALENDAR\r\n",
            raw.trim_end()
        );
        parse_calendar(&wrapped)
            .map_err(|e| CodecError::Decode(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| CodecError::Decode("no VEVENT block".to_string()))
    }

    fn serialize_calendar(&self, events: &[Event]) -> CodecResult<String> {
        Ok(write_calendar(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use icalproxy_core::{Alarm, EventStatus, EventTime, RawProperty};

    #[test]
    fn stored_bodies_read_back() {
        let mut event = Event::new("evt-1")
            .with_start(EventTime::from_utc(Utc.with_ymd_and_hms(2025, 1, 2, 9, 30, 0).unwrap()))
            .with_end(EventTime::from_utc(Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap()))
            .with_summary("Review, part 1")
            .with_description("Agenda:\n- items")
            .with_status(EventStatus::Confirmed);
        event.extra.push(RawProperty::new("RRULE", "FREQ=WEEKLY;BYDAY=TH"));
        event.alarms.push(Alarm::display("Review, part 1", "-PT5M"));

        let codec = IcsCodec::new();
        let raw = codec.encode_event(&event).unwrap();
        assert!(raw.starts_with("BEGIN:VEVENT\r\n"));
        assert_eq!(codec.decode_event(&raw).unwrap(), event);
    }

    #[test]
    fn corrupt_bodies_fail_to_decode() {
        let codec = IcsCodec::new();
        assert!(matches!(codec.decode_event("garbage"), Err(CodecError::Decode(_))));
        assert!(matches!(codec.decode_event(""), Err(CodecError::Decode(_))));
    }

    #[test]
    fn feed_survives_a_pass_through() {
        let feed = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:1\r\nDTSTART:20250101T100000Z\r\nSUMMARY:One\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let codec = IcsCodec::new();
        let events = codec.parse_feed(feed).unwrap();
        let text = codec.serialize_calendar(&events).unwrap();
        assert!(text.contains("UID:1\r\nDTSTART:20250101T100000Z\r\nSUMMARY:One\r\n"));
        assert_eq!(codec.parse_feed(&text).unwrap(), events);
    }
}
