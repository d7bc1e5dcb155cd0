//! Rule-based event filtering.
//!
//! A [`FilterPipeline`] admits an event only when every [`FilterRule`] matches
//! it. Rules are compiled once from configuration; anything that cannot be
//! understood (unknown field, unknown operator, unusable value) compiles to a
//! rule that never matches.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use tracing::{trace, warn};

use crate::event::{Event, EventStatus, TextField};
use crate::pattern::Pattern;
use crate::time::EventTime;

/// The event attribute a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Text(TextField),
    Status,
    Start,
    End,
}

impl FilterField {
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(text) = TextField::parse(name) {
            return Some(Self::Text(text));
        }
        match name.trim().to_ascii_lowercase().as_str() {
            "status" => Some(Self::Status),
            "start" | "dtstart" => Some(Self::Start),
            "end" | "dtend" => Some(Self::End),
            _ => None,
        }
    }
}

/// Comparison applied between the field and the rule values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    Matches,
    NotMatches,
    Before,
    After,
    OnOrBefore,
    OnOrAfter,
    /// Anything else; never matches.
    Unknown(String),
}

impl FilterOperator {
    /// Parses an operator name, ignoring case and `-`/`_` separators.
    pub fn parse(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "equals" | "eq" => Self::Equals,
            "notequals" | "ne" => Self::NotEquals,
            "contains" => Self::Contains,
            "notcontains" => Self::NotContains,
            "startswith" => Self::StartsWith,
            "notstartswith" => Self::NotStartsWith,
            "endswith" => Self::EndsWith,
            "notendswith" => Self::NotEndsWith,
            "matches" => Self::Matches,
            "notmatches" => Self::NotMatches,
            "before" => Self::Before,
            "after" => Self::After,
            "onorbefore" => Self::OnOrBefore,
            "onorafter" => Self::OnOrAfter,
            _ => Self::Unknown(name.to_string()),
        }
    }

    /// `not-*` operators match when none of the values does.
    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            Self::NotEquals
                | Self::NotContains
                | Self::NotStartsWith
                | Self::NotEndsWith
                | Self::NotMatches
        )
    }
}

/// A temporal comparison value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalValue {
    Instant(DateTime<Utc>),
    Date(NaiveDate),
    TimeOfDay(NaiveTime),
    /// The evaluation instant.
    Now,
}

impl TemporalValue {
    /// Accepts RFC 3339, `YYYY-MM-DD`, `HH:MM[:SS]` or `now`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("now") {
            return Some(Self::Now);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(Self::Instant(dt.with_timezone(&Utc)));
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return Some(Self::Date(date));
        }
        NaiveTime::parse_from_str(text, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
            .ok()
            .map(Self::TimeOfDay)
    }
}

/// A compiled rule value.
#[derive(Debug, Clone, PartialEq)]
enum RuleValue {
    Text(String),
    Pattern(Pattern),
    Status(EventStatus),
    Temporal(TemporalValue),
}

/// One compiled filter rule.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRule {
    field: Option<FilterField>,
    operator: FilterOperator,
    values: Vec<RuleValue>,
    /// Set when the rule could not be compiled; such a rule never matches.
    broken: bool,
}

impl FilterRule {
    /// Compiles a rule from its configuration strings.
    pub fn compile(field: &str, operator: &str, values: &[String]) -> Self {
        let parsed_field = FilterField::parse(field);
        let operator = FilterOperator::parse(operator);
        let mut rule = Self {
            field: parsed_field,
            operator,
            values: Vec::with_capacity(values.len()),
            broken: false,
        };

        let Some(field_kind) = parsed_field else {
            warn!(field = %field, "unknown filter field, rule will never match");
            rule.broken = true;
            return rule;
        };
        if let FilterOperator::Unknown(ref name) = rule.operator {
            warn!(operator = %name, "unknown filter operator, rule will never match");
            rule.broken = true;
            return rule;
        }

        for raw in values {
            match compile_value(field_kind, &rule.operator, raw) {
                Some(value) => rule.values.push(value),
                None => {
                    warn!(field = %field, value = %raw, "unusable filter value, rule will never match");
                    rule.broken = true;
                }
            }
        }
        rule
    }

    pub fn field(&self) -> Option<FilterField> {
        self.field
    }

    pub fn operator(&self) -> &FilterOperator {
        &self.operator
    }

    /// Evaluates the rule against one event.
    pub fn matches(&self, event: &Event, tz: &Tz, now: DateTime<Utc>) -> bool {
        let Some(field) = self.field.filter(|_| !self.broken) else {
            return false;
        };
        if self.values.is_empty() {
            return false;
        }

        let hit = |value: &RuleValue| self.value_matches(field, value, event, tz, now);
        if self.operator.is_negated() {
            !self.values.iter().any(hit)
        } else {
            self.values.iter().any(hit)
        }
    }

    fn value_matches(
        &self,
        field: FilterField,
        value: &RuleValue,
        event: &Event,
        tz: &Tz,
        now: DateTime<Utc>,
    ) -> bool {
        use FilterOperator as Op;

        match (field, value) {
            (FilterField::Text(text_field), _) => {
                let actual = event.text(text_field);
                match (&self.operator, value) {
                    (Op::Equals | Op::NotEquals, RuleValue::Pattern(p)) => p.matches_whole(actual),
                    (Op::Contains | Op::NotContains, RuleValue::Pattern(p))
                    | (Op::Matches | Op::NotMatches, RuleValue::Pattern(p)) => p.is_match(actual),
                    (Op::StartsWith | Op::NotStartsWith, RuleValue::Text(t)) => {
                        actual.starts_with(t.as_str())
                    }
                    (Op::EndsWith | Op::NotEndsWith, RuleValue::Text(t)) => {
                        actual.ends_with(t.as_str())
                    }
                    _ => false,
                }
            }
            (FilterField::Status, RuleValue::Status(expected)) => event.status == *expected,
            (FilterField::Start | FilterField::End, RuleValue::Temporal(expected)) => {
                let actual = match field {
                    FilterField::Start => event.start,
                    _ => event.end,
                };
                let Some(actual) = actual else {
                    trace!(uid = ?event.uid, "event has no time for temporal rule");
                    return false;
                };
                let ordering = compare_temporal(actual, *expected, tz, now);
                match self.operator {
                    Op::Equals | Op::NotEquals => ordering == Ordering::Equal,
                    Op::Before => ordering == Ordering::Less,
                    Op::After => ordering == Ordering::Greater,
                    Op::OnOrBefore => ordering != Ordering::Greater,
                    Op::OnOrAfter => ordering != Ordering::Less,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

fn compile_value(field: FilterField, operator: &FilterOperator, raw: &str) -> Option<RuleValue> {
    use FilterOperator as Op;

    match field {
        FilterField::Text(_) => match operator {
            Op::Equals | Op::NotEquals | Op::Contains | Op::NotContains => {
                Pattern::parse(raw, false).ok().map(RuleValue::Pattern)
            }
            Op::Matches | Op::NotMatches => Pattern::parse(raw, true).ok().map(RuleValue::Pattern),
            Op::StartsWith | Op::NotStartsWith | Op::EndsWith | Op::NotEndsWith => {
                Some(RuleValue::Text(raw.to_string()))
            }
            _ => None,
        },
        FilterField::Status => match operator {
            Op::Equals | Op::NotEquals => Some(RuleValue::Status(EventStatus::parse(raw))),
            _ => None,
        },
        FilterField::Start | FilterField::End => match operator {
            Op::Equals | Op::NotEquals | Op::Before | Op::After | Op::OnOrBefore | Op::OnOrAfter => {
                TemporalValue::parse(raw).map(RuleValue::Temporal)
            }
            _ => None,
        },
    }
}

fn compare_temporal(actual: EventTime, expected: TemporalValue, tz: &Tz, now: DateTime<Utc>) -> Ordering {
    match expected {
        TemporalValue::Instant(instant) => actual.to_utc_datetime().cmp(&instant),
        TemporalValue::Now => actual.to_utc_datetime().cmp(&now),
        TemporalValue::Date(date) => actual.date_in(tz).cmp(&date),
        TemporalValue::TimeOfDay(time) => actual.time_in(tz).cmp(&time),
    }
}

/// An ordered, conjunctive list of rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPipeline {
    rules: Vec<FilterRule>,
}

impl FilterPipeline {
    pub fn new(rules: Vec<FilterRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// `true` when the rule list is empty or every rule matches.
    pub fn matches(&self, event: &Event, tz: &Tz, now: DateTime<Utc>) -> bool {
        self.rules.iter().all(|rule| rule.matches(event, tz, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn rule(field: &str, op: &str, values: &[&str]) -> FilterRule {
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        FilterRule::compile(field, op, &values)
    }

    fn meeting() -> Event {
        Event::new("m1")
            .with_summary("Weekly Planning")
            .with_location("Room 4")
            .with_status(EventStatus::Confirmed)
            .with_start(EventTime::from_utc(Utc.with_ymd_and_hms(2025, 3, 11, 9, 30, 0).unwrap()))
    }

    #[test]
    fn empty_pipeline_admits_everything() {
        let pipeline = FilterPipeline::default();
        assert!(pipeline.matches(&Event::default(), &Tz::UTC, now()));
    }

    #[test]
    fn all_rules_must_match() {
        let pipeline = FilterPipeline::new(vec![
            rule("summary", "contains", &["Planning"]),
            rule("location", "startswith", &["Room"]),
        ]);
        assert!(pipeline.matches(&meeting(), &Tz::UTC, now()));

        let pipeline = FilterPipeline::new(vec![
            rule("summary", "contains", &["Planning"]),
            rule("location", "equals", &["Room 5"]),
        ]);
        assert!(!pipeline.matches(&meeting(), &Tz::UTC, now()));
    }

    #[test]
    fn unknown_operator_fails_closed() {
        let r = rule("summary", "sounds-like", &["Weekly"]);
        assert_eq!(r.operator(), &FilterOperator::Unknown("sounds-like".to_string()));
        assert!(!r.matches(&meeting(), &Tz::UTC, now()));
        assert!(!rule("organizer", "equals", &["x"]).matches(&meeting(), &Tz::UTC, now()));
    }

    #[test]
    fn negated_operators_require_no_value_to_match() {
        let event = meeting();
        assert!(rule("summary", "not-contains", &["Lunch", "Holiday"]).matches(&event, &Tz::UTC, now()));
        assert!(!rule("summary", "not-contains", &["Lunch", "Weekly"]).matches(&event, &Tz::UTC, now()));
        assert!(rule("summary", "contains", &["Lunch", "Weekly"]).matches(&event, &Tz::UTC, now()));
    }

    #[test]
    fn regex_values() {
        let event = meeting();
        assert!(!rule("summary", "matches", &[r"^weekly\s"]).matches(&event, &Tz::UTC, now()));
        assert!(rule("summary", "matches", &[r"/^weekly\s/i"]).matches(&event, &Tz::UTC, now()));
        assert!(rule("summary", "equals", &["/weekly planning/i"]).matches(&event, &Tz::UTC, now()));
        assert!(!rule("summary", "matches", &["/(broken/"]).matches(&event, &Tz::UTC, now()));
    }

    #[test]
    fn status_rules() {
        let event = meeting();
        assert!(rule("status", "equals", &["confirmed"]).matches(&event, &Tz::UTC, now()));
        assert!(rule("status", "not-equals", &["CANCELLED"]).matches(&event, &Tz::UTC, now()));
        assert!(!rule("status", "contains", &["CONF"]).matches(&event, &Tz::UTC, now()));
    }

    #[test]
    fn temporal_rules() {
        let event = meeting();
        let tz = chrono_tz::Europe::Paris;
        assert!(rule("start", "after", &["now"]).matches(&event, &tz, now()));
        assert!(rule("start", "equals", &["2025-03-11"]).matches(&event, &tz, now()));
        assert!(rule("start", "equals", &["10:30"]).matches(&event, &tz, now()));
        assert!(rule("start", "on-or-before", &["2025-03-11T09:30:00Z"]).matches(&event, &tz, now()));
        assert!(!rule("start", "before", &["2025-03-11T09:30:00Z"]).matches(&event, &tz, now()));
        assert!(!rule("end", "before", &["now"]).matches(&event, &tz, now()));
        assert!(!rule("start", "after", &["next week"]).matches(&event, &tz, now()));
    }
}
