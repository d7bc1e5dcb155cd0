//! The calendar proxy service.
//!
//! [`ProxyConfig`] reads the TOML configuration file, [`CalendarService`]
//! answers every per-calendar operation on top of a storage backend, a feed
//! fetcher and the iCalendar codec:
//!
//! ```no_run
//! use icalproxy_server::{CalendarService, EventView, ProxyConfig};
//!
//! # async fn demo() -> icalproxy_server::ServerResult<()> {
//! let config = ProxyConfig::load()?;
//! let service = CalendarService::open(config, None).await?;
//!
//! let report = service.sync("work").await?;
//! println!("{} new, {} gone", report.inserted, report.removed);
//!
//! let kept = service.events("work", EventView::Persisted).await?;
//! let text = service.render("work", None).await?;
//! # let _ = (kept, text);
//! # Ok(()) }
//! ```

pub mod calendar;
pub mod config;
pub mod error;
pub mod locks;
pub mod service;

pub use calendar::ProxyCalendar;
pub use config::ProxyConfig;
pub use error::{ServerError, ServerResult};
pub use locks::KeyedLocks;
pub use service::{CalendarEntry, CalendarService, ConfigSource, EventView, SyncReport};
