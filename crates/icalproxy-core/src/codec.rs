//! The wire-format capability.
//!
//! The core never reads or writes calendar text itself; it goes through an
//! [`EventCodec`]. The iCalendar implementation lives in `icalproxy-feed`.

use thiserror::Error;

use crate::event::Event;

/// Errors raised by a codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input is not a well-formed calendar.
    #[error("malformed calendar: {0}")]
    Parse(String),

    /// A single event body could not be read back.
    #[error("malformed event body: {0}")]
    Decode(String),

    /// An event could not be written.
    #[error("failed to encode event: {0}")]
    Encode(String),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Parses and serializes calendar text.
pub trait EventCodec: Send + Sync {
    /// Parses a complete feed into its events.
    fn parse_feed(&self, text: &str) -> CodecResult<Vec<Event>>;

    /// Serializes one event as a self-contained body suitable for persistence.
    fn encode_event(&self, event: &Event) -> CodecResult<String>;

    /// Reads back a body produced by [`EventCodec::encode_event`].
    fn decode_event(&self, raw: &str) -> CodecResult<Event>;

    /// Serializes a complete calendar.
    fn serialize_calendar(&self, events: &[Event]) -> CodecResult<String>;
}
