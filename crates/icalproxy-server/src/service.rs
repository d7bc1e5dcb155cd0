//! The calendar service: every per-calendar operation the proxy exposes.
//!
//! A request resolves the calendar by name (static file first, then the
//! storage backend), compiles it into a [`ProxyCalendar`] and runs
//!
//! ```text
//! fetch ──▶ parse ──▶ reconcile ──▶ filter ──▶ alarms ──▶ transform ──▶ serialize
//! ```
//!
//! Reconcile passes for the same calendar are serialised through
//! [`KeyedLocks`]; different calendars proceed concurrently.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use icalproxy_core::{
    CalendarConfig, Event, EventCodec, EventSource, EventSummary, Reconciliation,
    ReconciliationEngine, StorageAdapter, TransformerRegistry,
};
use icalproxy_feed::{FeedClient, FeedFetcher, FetchConfig, IcsCodec};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calendar::ProxyCalendar;
use crate::config::ProxyConfig;
use crate::error::{ServerError, ServerResult};
use crate::locks::KeyedLocks;

/// Where a calendar configuration is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// The configuration file; read-only through the service.
    Static,
    /// The storage backend.
    Stored,
}

/// A named calendar configuration and its origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEntry {
    pub name: String,
    pub source: ConfigSource,
    pub config: CalendarConfig,
}

/// Counts reported by [`CalendarService::sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Uids stored after the pass that were not stored before.
    pub inserted: usize,
    /// Uids stored before the pass that are gone after it.
    pub removed: usize,
    /// Size of the reconciled union.
    pub union: usize,
}

impl From<&Reconciliation> for SyncReport {
    fn from(outcome: &Reconciliation) -> Self {
        Self {
            inserted: outcome.inserted,
            removed: outcome.removed,
            union: outcome.union.len(),
        }
    }
}

/// Which event set [`CalendarService::events`] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventView {
    /// The feed as fetched now; storage is not touched.
    Live,
    /// What storage holds, without fetching.
    Persisted,
    /// The reconciled union; runs a full pass.
    #[default]
    Union,
}

impl EventView {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Persisted => "persisted",
            Self::Union => "union",
        }
    }
}

impl fmt::Display for EventView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrates fetching, reconciliation and rendering for named calendars.
pub struct CalendarService {
    config: ProxyConfig,
    fetcher: Arc<dyn FeedFetcher>,
    registry: TransformerRegistry,
    engine: ReconciliationEngine,
    locks: KeyedLocks,
}

impl CalendarService {
    pub fn new(
        config: ProxyConfig,
        storage: Arc<dyn StorageAdapter>,
        fetcher: Arc<dyn FeedFetcher>,
        codec: Arc<dyn EventCodec>,
    ) -> Self {
        Self {
            config,
            fetcher,
            registry: TransformerRegistry::builtin(),
            engine: ReconciliationEngine::new(storage, codec),
            locks: KeyedLocks::new(),
        }
    }

    /// Builds the production service: storage from the configured
    /// connection string (or `storage` if given), HTTP fetching and the
    /// iCalendar codec. An unusable storage string fails here.
    pub async fn open(config: ProxyConfig, storage: Option<&str>) -> ServerResult<Self> {
        let uri = config.storage_uri(storage);
        let storage = icalproxy_store::open_storage(&uri).await?;

        let mut fetch = FetchConfig::new();
        if let Some(secs) = config.fetch_timeout_secs {
            fetch = fetch.with_timeout_secs(secs);
        }
        let fetcher = FeedClient::new(fetch)?;

        info!(
            backend = storage.name(),
            calendars = config.calendars.len(),
            "calendar service ready"
        );
        Ok(Self::new(
            config,
            storage,
            Arc::new(fetcher),
            Arc::new(IcsCodec::new()),
        ))
    }

    /// Builder: replace the transformer registry.
    pub fn with_registry(mut self, registry: TransformerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        self.engine.storage()
    }

    /// Every known calendar; a static definition hides a stored one of the same name.
    pub async fn list_calendars(&self) -> ServerResult<Vec<CalendarEntry>> {
        let stored = self.storage().list_configs().await?;
        let mut merged: BTreeMap<String, CalendarEntry> = stored
            .into_iter()
            .map(|(name, config)| {
                let entry = CalendarEntry {
                    name: name.clone(),
                    source: ConfigSource::Stored,
                    config,
                };
                (name, entry)
            })
            .collect();
        for (name, config) in &self.config.calendars {
            merged.insert(
                name.clone(),
                CalendarEntry {
                    name: name.clone(),
                    source: ConfigSource::Static,
                    config: config.clone(),
                },
            );
        }
        Ok(merged.into_values().collect())
    }

    pub async fn get_calendar(&self, name: &str) -> ServerResult<CalendarEntry> {
        if let Some(config) = self.config.calendars.get(name) {
            return Ok(CalendarEntry {
                name: name.to_string(),
                source: ConfigSource::Static,
                config: config.clone(),
            });
        }
        match self.storage().get_config(name).await? {
            Some(config) => Ok(CalendarEntry {
                name: name.to_string(),
                source: ConfigSource::Stored,
                config,
            }),
            None => Err(ServerError::not_found(name)),
        }
    }

    /// Creates or replaces a stored calendar. The configuration is compiled
    /// first so nothing invalid reaches storage.
    pub async fn upsert_calendar(
        &self,
        name: &str,
        config: CalendarConfig,
    ) -> ServerResult<CalendarEntry> {
        if self.config.is_static(name) {
            return Err(ServerError::conflict(name, "modified"));
        }
        ProxyCalendar::build(name, config.clone(), &self.registry)?;
        self.storage().upsert_config(name, &config).await?;
        info!(calendar = %name, backend = self.storage().name(), "stored calendar configuration");
        Ok(CalendarEntry {
            name: name.to_string(),
            source: ConfigSource::Stored,
            config,
        })
    }

    /// Removes a stored calendar configuration. Persisted events are kept.
    pub async fn delete_calendar(&self, name: &str) -> ServerResult<()> {
        if self.config.is_static(name) {
            return Err(ServerError::conflict(name, "deleted"));
        }
        if !self.storage().delete_config(name).await? {
            return Err(ServerError::not_found(name));
        }
        info!(calendar = %name, "deleted calendar configuration");
        Ok(())
    }

    /// Runs one reconcile pass and reports what changed.
    pub async fn sync(&self, name: &str) -> ServerResult<SyncReport> {
        let calendar = self.calendar(name).await?;
        let outcome = self.reconcile(&calendar).await?;
        Ok(SyncReport::from(&outcome))
    }

    /// Events of `name` as seen through `view`, tagged with their provenance.
    pub async fn events(&self, name: &str, view: EventView) -> ServerResult<Vec<EventSummary>> {
        let calendar = self.calendar(name).await?;
        let summaries: Vec<EventSummary> = match view {
            EventView::Live => self
                .fetch_live(&calendar)
                .await?
                .iter()
                .map(|event| EventSummary::from_event(event, Some(EventSource::Live)))
                .collect(),
            EventView::Persisted => self
                .engine
                .persisted_events(calendar.storage_key())
                .await?
                .iter()
                .map(|event| EventSummary::from_event(event, Some(EventSource::Persisted)))
                .collect(),
            EventView::Union => self
                .reconcile(&calendar)
                .await?
                .union
                .iter()
                .map(EventSummary::from)
                .collect(),
        };
        debug!(calendar = %name, view = %view, count = summaries.len(), "listed events");
        Ok(summaries)
    }

    /// The proxied calendar as iCalendar text.
    ///
    /// A supplied `key` must match the calendar's `api_key`.
    pub async fn render(&self, name: &str, key: Option<&str>) -> ServerResult<String> {
        let calendar = self.calendar(name).await?;
        calendar.authorize(key)?;
        let events = self.proxied_events(&calendar).await?;
        Ok(self.engine.codec().serialize_calendar(&events)?)
    }

    /// The events [`CalendarService::render`] would emit, flattened.
    pub async fn preview(&self, name: &str, key: Option<&str>) -> ServerResult<Vec<EventSummary>> {
        let calendar = self.calendar(name).await?;
        calendar.authorize(key)?;
        let events = self.proxied_events(&calendar).await?;
        Ok(events
            .iter()
            .map(|event| EventSummary::from_event(event, None))
            .collect())
    }

    async fn calendar(&self, name: &str) -> ServerResult<ProxyCalendar> {
        let entry = self.get_calendar(name).await?;
        ProxyCalendar::build(entry.name, entry.config, &self.registry)
    }

    async fn fetch_live(&self, calendar: &ProxyCalendar) -> ServerResult<Vec<Event>> {
        let text = self.fetcher.fetch(calendar.feed_url()).await?;
        let events = self.engine.codec().parse_feed(&text)?;
        debug!(calendar = %calendar.name(), count = events.len(), "fetched feed");
        Ok(events)
    }

    async fn reconcile(&self, calendar: &ProxyCalendar) -> ServerResult<Reconciliation> {
        let live = self.fetch_live(calendar).await?;
        let _guard = self.locks.lock(calendar.storage_key()).await;
        Ok(self
            .engine
            .reconcile(calendar.storage_key(), &live, calendar.retention())
            .await?)
    }

    async fn proxied_events(&self, calendar: &ProxyCalendar) -> ServerResult<Vec<Event>> {
        let outcome = self.reconcile(calendar).await?;
        let events = calendar.prepare(outcome.into_events(), Utc::now());
        debug!(calendar = %calendar.name(), count = events.len(), "prepared calendar");
        Ok(events)
    }
}
