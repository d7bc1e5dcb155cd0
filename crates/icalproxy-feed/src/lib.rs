//! Feed plumbing for the calendar proxy.
//!
//! - [`FeedFetcher`] / [`FeedClient`]: turn a feed URL into raw text
//!   (`http(s)://`, `webcal://`, `file://`).
//! - [`IcsCodec`]: the iCalendar implementation of
//!   [`icalproxy_core::EventCodec`].

pub mod config;
pub mod error;
pub mod fetcher;
pub mod ics;

pub use config::FetchConfig;
pub use error::{FeedError, FeedErrorCode, FeedResult};
pub use fetcher::{FeedClient, FeedFetcher, StaticFetcher};
pub use ics::IcsCodec;
