//! Reconciliation of a live feed against the persisted state of a calendar.
//!
//! [`reconcile_records`] is the pure merge; [`ReconciliationEngine`] wraps it
//! with the load and save round trip through a [`StorageAdapter`].
//!
//! The engine does not serialize concurrent passes for the same key: two
//! overlapping passes both read the prior state and the last save wins.
//! Callers that can trigger overlapping passes must lock per key.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::codec::{CodecError, EventCodec};
use crate::event::{Event, SourcedEvent};
use crate::record::{CalendarStore, EventRecord};
use crate::retention::RetentionPolicy;
use crate::storage::{StorageAdapter, StorageError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Live events followed by retained persisted events.
    pub union: Vec<SourcedEvent>,
    /// The store as saved.
    pub store: CalendarStore,
    /// Uids present after the pass but not before.
    pub inserted: usize,
    /// Uids present before the pass but not after.
    pub removed: usize,
}

impl Reconciliation {
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.union.iter().map(|sourced| &sourced.event)
    }

    pub fn into_events(self) -> Vec<Event> {
        self.union.into_iter().map(|sourced| sourced.event).collect()
    }
}

/// Merges `live` into `prior` under `policy` at instant `now`.
pub fn reconcile_records(
    prior: &CalendarStore,
    live: &[Event],
    policy: &RetentionPolicy,
    codec: &dyn EventCodec,
    now: DateTime<Utc>,
) -> Result<Reconciliation, CodecError> {
    let cancelled: HashSet<&str> = live
        .iter()
        .filter(|event| event.is_cancelled())
        .filter_map(Event::persistable_uid)
        .collect();

    let live_kept: Vec<&Event> = live
        .iter()
        .filter(|event| !event.is_cancelled())
        .filter(|event| event.persistable_uid().is_none_or(|uid| !cancelled.contains(uid)))
        .collect();

    let mut store: CalendarStore = prior
        .iter()
        .filter(|(uid, _)| !cancelled.contains(uid.as_str()))
        .map(|(uid, record)| (uid.clone(), record.clone()))
        .collect();

    let mut live_uids: HashSet<&str> = HashSet::new();
    for event in &live_kept {
        let Some(uid) = event.persistable_uid() else {
            continue;
        };
        live_uids.insert(uid);
        let first_seen = store
            .get(uid)
            .and_then(|existing| existing.first_seen)
            .unwrap_or(now);
        let record = EventRecord::new(uid, codec.encode_event(event)?)
            .with_times(
                event.start.map(|t| t.to_utc_datetime()),
                event.end.map(|t| t.to_utc_datetime()),
            )
            .with_seen(first_seen, now);
        store.insert(uid.to_string(), record);
    }

    let earliest_live_end = live_kept
        .iter()
        .filter(|event| event.persistable_uid().is_some())
        .filter_map(|event| event.end_or_start())
        .min();
    store.retain(|uid, record| {
        if live_uids.contains(uid.as_str()) {
            return true;
        }
        let keep = policy.keeps_missing(record.end_time(), earliest_live_end, now);
        debug!(uid = %uid, keep, "missing from live feed");
        keep
    });

    store.retain(|uid, record| {
        let survives = policy.survives_prune(record.end_time(), now);
        if !survives {
            debug!(uid = %uid, "pruned by max age");
        }
        survives
    });

    let mut union: Vec<SourcedEvent> = live_kept
        .iter()
        .filter(|event| match event.persistable_uid() {
            Some(uid) => store.contains_key(uid),
            None => policy.survives_prune(event.end_or_start(), now),
        })
        .map(|event| SourcedEvent::live((*event).clone()))
        .collect();

    for (uid, record) in store.iter().filter(|(uid, _)| !live_uids.contains(uid.as_str())) {
        match codec.decode_event(&record.raw) {
            Ok(event) => union.push(SourcedEvent::persisted(event)),
            Err(e) => warn!(uid = %uid, error = %e, "skipping unreadable persisted event"),
        }
    }

    let inserted = store.keys().filter(|uid| !prior.contains_key(*uid)).count();
    let removed = prior.keys().filter(|uid| !store.contains_key(*uid)).count();

    Ok(Reconciliation {
        union,
        store,
        inserted,
        removed,
    })
}

/// Reconciles feeds against a storage backend.
#[derive(Clone)]
pub struct ReconciliationEngine {
    storage: Arc<dyn StorageAdapter>,
    codec: Arc<dyn EventCodec>,
}

impl ReconciliationEngine {
    pub fn new(storage: Arc<dyn StorageAdapter>, codec: Arc<dyn EventCodec>) -> Self {
        Self { storage, codec }
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    pub fn codec(&self) -> &Arc<dyn EventCodec> {
        &self.codec
    }

    /// Runs one pass for `key` and persists the result.
    pub async fn reconcile(
        &self,
        key: &str,
        live: &[Event],
        policy: &RetentionPolicy,
    ) -> Result<Reconciliation, ReconcileError> {
        self.reconcile_at(key, live, policy, Utc::now()).await
    }

    /// [`ReconciliationEngine::reconcile`] with an explicit clock.
    pub async fn reconcile_at(
        &self,
        key: &str,
        live: &[Event],
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<Reconciliation, ReconcileError> {
        let prior = self.storage.load_calendar(key).await?;
        let outcome = reconcile_records(&prior, live, policy, self.codec.as_ref(), now)?;
        self.storage.save_calendar(key, &outcome.store).await?;
        info!(
            calendar = %key,
            backend = self.storage.name(),
            inserted = outcome.inserted,
            removed = outcome.removed,
            union = outcome.union.len(),
            "reconciled calendar"
        );
        Ok(outcome)
    }

    /// Persisted events of `key`, reconstructed; unreadable bodies are skipped.
    pub async fn persisted_events(&self, key: &str) -> Result<Vec<Event>, ReconcileError> {
        let store = self.storage.load_calendar(key).await?;
        Ok(store
            .iter()
            .filter_map(|(uid, record)| match self.codec.decode_event(&record.raw) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(calendar = %key, uid = %uid, error = %e, "skipping unreadable persisted event");
                    None
                }
            })
            .collect())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::JsonCodec;
    use super::*;
    use crate::event::{EventSource, EventStatus};
    use crate::storage::memory::MemoryStorage;
    use crate::time::EventTime;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn ended_days_ago(uid: &str, days: i64) -> Event {
        let end = now() - Duration::days(days);
        Event::new(uid)
            .with_summary(uid.to_uppercase())
            .with_start(EventTime::from_utc(end - Duration::hours(1)))
            .with_end(EventTime::from_utc(end))
    }

    fn record_for(event: &Event, seen: DateTime<Utc>) -> EventRecord {
        EventRecord::new(event.uid.clone().unwrap(), JsonCodec.encode_event(event).unwrap())
            .with_times(
                event.start.map(|t| t.to_utc_datetime()),
                event.end.map(|t| t.to_utc_datetime()),
            )
            .with_seen(seen, seen)
    }

    fn store_of(events: &[Event]) -> CalendarStore {
        let seen = now() - Duration::days(100);
        events
            .iter()
            .map(|e| (e.uid.clone().unwrap(), record_for(e, seen)))
            .collect()
    }

    fn run(prior: &CalendarStore, live: &[Event], policy: RetentionPolicy) -> Reconciliation {
        reconcile_records(prior, live, &policy, &JsonCodec, now()).unwrap()
    }

    fn uids(outcome: &Reconciliation) -> Vec<(String, EventSource)> {
        outcome
            .union
            .iter()
            .map(|s| (s.event.uid.clone().unwrap_or_default(), s.source))
            .collect()
    }

    #[test]
    fn new_events_are_recorded() {
        let live = [ended_days_ago("a", -1)];
        let outcome = run(&CalendarStore::new(), &live, RetentionPolicy::Coverage);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.removed, 0);
        let record = &outcome.store["a"];
        assert_eq!(record.first_seen, Some(now()));
        assert_eq!(record.last_seen, Some(now()));
        assert_eq!(record.dtend, Some(now() + Duration::days(1)));
    }

    #[test]
    fn first_seen_is_preserved() {
        let event = ended_days_ago("a", -1);
        let prior = store_of(std::slice::from_ref(&event));
        let outcome = run(&prior, &[event], RetentionPolicy::Coverage);
        assert_eq!(outcome.store["a"].first_seen, Some(now() - Duration::days(100)));
        assert_eq!(outcome.store["a"].last_seen, Some(now()));
        assert_eq!(outcome.inserted, 0);
    }

    #[test]
    fn cancellation_wins() {
        let persisted = ended_days_ago("u", 60);
        let prior = store_of(&[persisted.clone()]);
        let live = [
            persisted.clone().with_status(EventStatus::Cancelled),
            persisted,
            ended_days_ago("other", -2),
        ];
        let outcome = run(&prior, &live, RetentionPolicy::Archive {
            window_days: None,
            max_age_days: None,
        });
        assert!(!outcome.store.contains_key("u"));
        assert_eq!(uids(&outcome), [("other".to_string(), EventSource::Live)]);
        assert_eq!(outcome.removed, 1);
    }

    #[test]
    fn window_policy_evicts_recent_disappearance() {
        let prior = store_of(&[ended_days_ago("e1", 5)]);
        let outcome = run(&prior, &[], RetentionPolicy::Archive {
            window_days: Some(30),
            max_age_days: None,
        });
        assert!(outcome.store.is_empty());
        assert!(outcome.union.is_empty());
    }

    #[test]
    fn window_policy_keeps_old_disappearance() {
        let prior = store_of(&[ended_days_ago("e1", 60)]);
        let outcome = run(&prior, &[ended_days_ago("live", -1)], RetentionPolicy::Archive {
            window_days: Some(30),
            max_age_days: None,
        });
        assert!(outcome.store.contains_key("e1"));
        assert_eq!(
            uids(&outcome),
            [
                ("live".to_string(), EventSource::Live),
                ("e1".to_string(), EventSource::Persisted)
            ]
        );
    }

    #[test]
    fn missing_days_policy() {
        let prior = store_of(&[ended_days_ago("old", 4), ended_days_ago("recent", 1)]);
        let outcome = run(&prior, &[], RetentionPolicy::MissingDays(2));
        let kept: Vec<&String> = outcome.store.keys().collect();
        assert_eq!(kept, ["old"]);
        assert_eq!(outcome.removed, 1);
    }

    #[test]
    fn coverage_policy() {
        let prior = store_of(&[ended_days_ago("gap", 3), ended_days_ago("edge", 20)]);
        let live = [ended_days_ago("older", 10)];
        let outcome = run(&prior, &live, RetentionPolicy::Coverage);
        assert!(outcome.store.contains_key("gap"));
        assert!(!outcome.store.contains_key("edge"));
    }

    #[test]
    fn coverage_ignores_live_events_without_uid() {
        let prior = store_of(&[ended_days_ago("gap", 3)]);
        let mut anonymous = ended_days_ago("", 10);
        anonymous.uid = None;
        let live = [anonymous, ended_days_ago("recent", 1)];
        let outcome = run(&prior, &live, RetentionPolicy::Coverage);
        assert!(!outcome.store.contains_key("gap"));
        assert_eq!(outcome.removed, 1);
    }

    #[test]
    fn max_age_prunes_live_and_kept() {
        let prior = store_of(&[ended_days_ago("ancient", 120), ended_days_ago("kept", 40)]);
        let mut blank = ended_days_ago("", 200);
        blank.uid = None;
        let live = [ended_days_ago("old-live", 95), ended_days_ago("fresh", 1), blank];
        let outcome = run(&prior, &live, RetentionPolicy::Archive {
            window_days: Some(30),
            max_age_days: Some(90),
        });
        let stored: Vec<&String> = outcome.store.keys().collect();
        assert_eq!(stored, ["fresh", "kept"]);
        assert_eq!(
            uids(&outcome),
            [
                ("fresh".to_string(), EventSource::Live),
                ("kept".to_string(), EventSource::Persisted)
            ]
        );
    }

    #[test]
    fn blank_uids_are_never_persisted() {
        let mut anonymous = ended_days_ago("x", -1);
        anonymous.uid = Some("  ".into());
        let outcome = run(&CalendarStore::new(), &[anonymous], RetentionPolicy::Coverage);
        assert!(outcome.store.is_empty());
        assert_eq!(outcome.union.len(), 1);
        assert_eq!(outcome.union[0].source, EventSource::Live);
    }

    #[test]
    fn corrupt_records_are_skipped_but_kept() {
        let mut prior = store_of(&[ended_days_ago("good", 60)]);
        prior.insert("bad".into(), EventRecord::new("bad", "{not json").with_times(None, Some(now() - Duration::days(60))));
        let outcome = run(&prior, &[], RetentionPolicy::MissingDays(2));
        assert_eq!(outcome.store.len(), 2);
        assert_eq!(uids(&outcome), [("good".to_string(), EventSource::Persisted)]);
    }

    #[test]
    fn idempotent_passes() {
        let prior = store_of(&[ended_days_ago("p1", 60), ended_days_ago("p2", 3)]);
        let live = [ended_days_ago("l1", 1), ended_days_ago("l2", -3)];
        let policy = RetentionPolicy::MissingDays(2);

        let first = run(&prior, &live, policy);
        let second = run(&first.store, &live, policy);
        assert_eq!(first.store, second.store);
        assert_eq!(first.union, second.union);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.removed, 0);
    }

    #[tokio::test]
    async fn engine_round_trips_through_storage() {
        let storage = Arc::new(MemoryStorage::default());
        storage.seed("cal", store_of(&[ended_days_ago("old", 10)]));
        let engine = ReconciliationEngine::new(storage.clone(), Arc::new(JsonCodec));

        let outcome = engine
            .reconcile_at("cal", &[ended_days_ago("new", -1)], &RetentionPolicy::MissingDays(2), now())
            .await
            .unwrap();
        assert_eq!(outcome.union.len(), 2);
        assert_eq!(storage.snapshot("cal"), outcome.store);

        let persisted = engine.persisted_events("cal").await.unwrap();
        assert_eq!(persisted.len(), 2);
    }

    #[tokio::test]
    async fn failed_save_propagates() {
        let storage = Arc::new(MemoryStorage::failing());
        storage.seed("cal", store_of(&[ended_days_ago("old", 10)]));
        let engine = ReconciliationEngine::new(storage.clone(), Arc::new(JsonCodec));
        let result = engine
            .reconcile_at("cal", &[], &RetentionPolicy::Coverage, now())
            .await;
        assert!(matches!(result, Err(ReconcileError::Storage(_))));
        assert!(storage.snapshot("cal").contains_key("old"));
    }
}
