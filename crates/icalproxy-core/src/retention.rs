//! Retention policies: what happens to a persisted event once the live feed
//! stops listing it.
//!
//! [`RetentionPolicy::MissingDays`] compares the age of the event against a
//! threshold; [`RetentionPolicy::Archive`] compares its end against a fixed
//! horizon. The two shapes are evaluated independently, never merged.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::time::{days_before, days_since};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetentionError {
    #[error("persist_missing_days cannot be combined with window_days or max_age_days")]
    ConflictingShapes,
}

/// How missing events are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep a missing event iff the feed still lists something that ended earlier.
    #[default]
    Coverage,
    /// Keep a missing event iff it ended more than `n` days ago.
    MissingDays(u32),
    /// Evict missing events that ended inside the last `window_days`; prune
    /// everything older than `max_age_days`.
    Archive {
        window_days: Option<u32>,
        max_age_days: Option<u32>,
    },
}

impl RetentionPolicy {
    /// Builds a policy from the raw configuration values.
    ///
    /// Zero values count as unset. `persist_missing_days` is exclusive with
    /// the archive pair.
    pub fn from_parts(
        persist_missing_days: Option<u32>,
        window_days: Option<u32>,
        max_age_days: Option<u32>,
    ) -> Result<Self, RetentionError> {
        let positive = |v: Option<u32>| v.filter(|&n| n > 0);
        let (missing, window, max_age) = (
            positive(persist_missing_days),
            positive(window_days),
            positive(max_age_days),
        );

        match (missing, window.or(max_age)) {
            (Some(_), Some(_)) => Err(RetentionError::ConflictingShapes),
            (Some(n), None) => Ok(Self::MissingDays(n)),
            (None, Some(_)) => Ok(Self::Archive {
                window_days: window,
                max_age_days: max_age,
            }),
            (None, None) => Ok(Self::Coverage),
        }
    }

    /// Decides whether a record missing from the live feed survives.
    ///
    /// `record_end` is the record's end (or start) time; `earliest_live_end`
    /// the smallest end time among the live events.
    pub fn keeps_missing(
        &self,
        record_end: Option<DateTime<Utc>>,
        earliest_live_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        match *self {
            Self::Coverage => match (record_end, earliest_live_end) {
                (Some(end), Some(earliest)) => earliest < end,
                _ => false,
            },
            Self::MissingDays(n) => {
                record_end.is_some_and(|end| days_since(now, end) > f64::from(n))
            }
            Self::Archive { window_days, .. } => match window_days {
                Some(days) => record_end.unwrap_or(now) < days_before(now, days),
                None => true,
            },
        }
    }

    /// Instant before which records are pruned, if the policy has an age bound.
    pub fn prune_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Self::Archive {
                max_age_days: Some(days),
                ..
            } => Some(days_before(now, days)),
            _ => None,
        }
    }

    /// Whether a record with this end time survives the age bound.
    ///
    /// Records without a time are treated as ending now.
    pub fn survives_prune(&self, end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        self.prune_cutoff(now)
            .is_none_or(|cutoff| end.unwrap_or(now) >= cutoff)
    }
}
