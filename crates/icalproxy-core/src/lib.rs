//! Core of the calendar proxy: the event model, the filter and transformer
//! pipelines, retention policies and the reconciliation engine.
//!
//! This crate performs no network or file I/O. Feed retrieval and the
//! iCalendar codec live in `icalproxy-feed`, storage backends in
//! `icalproxy-store`; both plug in through the [`EventCodec`] and
//! [`StorageAdapter`] traits.
//!
//! ```text
//! feed text ──parse──▶ events ──reconcile──▶ union ──filter──▶ alarms ──transform──▶ feed text
//!                                  ▲   │
//!                         load     │   │ save
//!                                  │   ▼
//!                            StorageAdapter
//! ```

pub mod alarm;
pub mod codec;
pub mod config;
pub mod event;
pub mod filter;
pub mod pattern;
pub mod reconcile;
pub mod record;
pub mod retention;
pub mod storage;
pub mod time;
pub mod tracing;
pub mod transform;

pub use alarm::{AlarmConfig, AlarmTrigger, AlarmTriggerError};
pub use codec::{CodecError, CodecResult, EventCodec};
pub use config::{AlarmsConfig, CalendarConfig, ConfigError, RuleConfig};
pub use event::{
    Alarm, Event, EventSource, EventStatus, EventSummary, GeoPoint, RawProperty, SourcedEvent,
    TextField,
};
pub use filter::{FilterField, FilterOperator, FilterPipeline, FilterRule, TemporalValue};
pub use pattern::{Pattern, PatternError};
pub use reconcile::{ReconcileError, Reconciliation, ReconciliationEngine, reconcile_records};
pub use record::{CalendarStore, EventRecord};
pub use retention::{RetentionError, RetentionPolicy};
pub use storage::{BoxFuture, StorageAdapter, StorageError, StorageResult};
pub use time::EventTime;
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use transform::{
    TransformError, TransformPipeline, Transformer, TransformerFactory, TransformerRegistry,
};
