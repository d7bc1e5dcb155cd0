//! `location_rules` and `location`: set or extract an event location.

use serde_json::{Map, Value};
use tracing::warn;

use super::{
    TransformError, Transformer, TransformerRegistryBuilder, rule_geo, rule_objects, rule_pattern,
    text_fields, truthy,
};
use crate::event::{Event, GeoPoint, TextField};
use crate::pattern::Pattern;

const MATCH_KEY: &str = "location_rules";
const UNIFIED_KEY: &str = "location";

/// What a rule does once its pattern matches.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationMode {
    /// Set a fixed location when the pattern matches one of `search_in`.
    Match {
        search_in: Vec<TextField>,
        location: Option<String>,
    },
    /// Copy a capture group of `source` into the location.
    Extract {
        source: TextField,
        capture_group: usize,
        set_if_blank: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationRule {
    pub pattern: Pattern,
    pub mode: LocationMode,
    pub geo: Option<GeoPoint>,
}

impl LocationRule {
    fn apply(&self, event: &mut Event) {
        match &self.mode {
            LocationMode::Match {
                search_in,
                location,
            } => {
                let fields: &[TextField] = if search_in.is_empty() {
                    &[TextField::Summary]
                } else {
                    search_in
                };
                let matched = fields.iter().any(|&field| {
                    let value = event.text(field);
                    !value.is_empty() && self.pattern.is_match(value)
                });
                if !matched {
                    return;
                }
                if let Some(location) = location.as_deref().filter(|l| !l.is_empty()) {
                    event.set_text(TextField::Location, location);
                }
                self.apply_geo(event);
            }
            LocationMode::Extract {
                source,
                capture_group,
                set_if_blank,
            } => {
                let value = event.text(*source);
                if value.is_empty() {
                    return;
                }
                let Some(target) = self
                    .pattern
                    .capture(value, *capture_group)
                    .filter(|t| !t.is_empty())
                else {
                    return;
                };
                if *set_if_blank && !event.text(TextField::Location).trim().is_empty() {
                    return;
                }
                event.set_text(TextField::Location, target.trim());
                self.apply_geo(event);
            }
        }
    }

    fn apply_geo(&self, event: &mut Event) {
        if let Some(geo) = self.geo {
            event.geo = Some(geo);
        }
    }
}

/// Applies its rules in order; later rules see earlier changes.
#[derive(Debug, Clone)]
pub struct LocationRules {
    key: &'static str,
    rules: Vec<LocationRule>,
}

impl LocationRules {
    pub fn rules(&self) -> &[LocationRule] {
        &self.rules
    }
}

impl Transformer for LocationRules {
    fn name(&self) -> &'static str {
        self.key
    }

    fn apply(&self, event: &mut Event) {
        for rule in &self.rules {
            rule.apply(event);
        }
    }
}

fn match_rule(pattern: Pattern, rule: &Map<String, Value>) -> LocationRule {
    LocationRule {
        pattern,
        mode: LocationMode::Match {
            search_in: text_fields(rule.get("search")),
            location: rule.get("location").and_then(Value::as_str).map(str::to_string),
        },
        geo: rule_geo(rule),
    }
}

fn extract_rule(pattern: Pattern, source_name: &str, rule: &Map<String, Value>) -> Option<LocationRule> {
    let Some(source) = TextField::parse(source_name) else {
        warn!(extract_from = %source_name, "unknown extract_from field, skipping location rule");
        return None;
    };
    let capture_group = rule
        .get("capture_group")
        .and_then(Value::as_u64)
        .map_or(1, |n| n as usize);
    let set_if_blank = match rule.get("set_if_blank") {
        Some(value) => truthy(Some(value)),
        None => true,
    };
    Some(LocationRule {
        pattern,
        mode: LocationMode::Extract {
            source,
            capture_group,
            set_if_blank,
        },
        geo: rule_geo(rule),
    })
}

fn wrap(key: &'static str, rules: Vec<LocationRule>) -> Vec<Box<dyn Transformer>> {
    if rules.is_empty() {
        return Vec::new();
    }
    vec![Box::new(LocationRules { key, rules })]
}

fn build_match_only(section: &Value) -> Result<Vec<Box<dyn Transformer>>, TransformError> {
    let rules = rule_objects(MATCH_KEY, section)?
        .into_iter()
        .filter_map(|rule| {
            let text = rule.get("pattern").and_then(Value::as_str)?;
            Some(match_rule(rule_pattern(text, rule), rule))
        })
        .collect();
    Ok(wrap(MATCH_KEY, rules))
}

fn build_unified(section: &Value) -> Result<Vec<Box<dyn Transformer>>, TransformError> {
    let rules = rule_objects(UNIFIED_KEY, section)?
        .into_iter()
        .filter_map(|rule| {
            let text = rule.get("pattern").and_then(Value::as_str)?;
            let pattern = rule_pattern(text, rule);
            match rule.get("extract_from").and_then(Value::as_str) {
                Some(source) => extract_rule(pattern, source, rule),
                None => Some(match_rule(pattern, rule)),
            }
        })
        .collect();
    Ok(wrap(UNIFIED_KEY, rules))
}

pub(super) fn register(builder: TransformerRegistryBuilder) -> TransformerRegistryBuilder {
    builder
        .register(MATCH_KEY, build_match_only)
        .register(UNIFIED_KEY, build_unified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(build: fn(&Value) -> Result<Vec<Box<dyn Transformer>>, TransformError>, section: Value, event: &mut Event) {
        for t in build(&section).unwrap() {
            t.apply(event);
        }
    }

    #[test]
    fn match_mode_sets_location_and_geo() {
        let mut event = Event::new("1").with_summary("Onsite: Paris office");
        apply(
            build_match_only,
            json!([{ "pattern": "/paris/i", "location": "Paris HQ", "geo": { "lat": 48.85, "lon": 2.35 } }]),
            &mut event,
        );
        assert_eq!(event.location.as_deref(), Some("Paris HQ"));
        assert_eq!(event.geo, Some(GeoPoint::new(48.85, 2.35)));
    }

    #[test]
    fn match_mode_searches_configured_fields() {
        let mut event = Event::new("1").with_summary("Sync").with_description("dial-in: zoom");
        apply(
            build_match_only,
            json!([{ "pattern": "zoom", "search": ["description"], "location": "Zoom" }]),
            &mut event,
        );
        assert_eq!(event.location.as_deref(), Some("Zoom"));

        let mut untouched = Event::new("2").with_summary("Sync").with_description("dial-in: zoom");
        apply(build_match_only, json!([{ "pattern": "zoom", "location": "Zoom" }]), &mut untouched);
        assert_eq!(untouched.location, None);
    }

    #[test]
    fn match_only_key_ignores_extract_rules() {
        let mut event = Event::new("1").with_description("Room: 4B");
        apply(
            build_match_only,
            json!([{ "pattern": r"/Room: (\w+)/", "extract_from": "description" }]),
            &mut event,
        );
        assert_eq!(event.location, None);
    }

    #[test]
    fn extract_mode_copies_capture() {
        let mut event = Event::new("1").with_description("Meet in Room:  4B ");
        apply(
            build_unified,
            json!([{ "pattern": r"/Room:\s*(\w+)/", "extract_from": "description", "lat": 1.5, "lon": 2.5 }]),
            &mut event,
        );
        assert_eq!(event.location.as_deref(), Some("4B"));
        assert_eq!(event.geo, Some(GeoPoint::new(1.5, 2.5)));
    }

    #[test]
    fn extract_respects_set_if_blank() {
        let section = json!([{ "pattern": r"/Room: (\w+)/", "extract_from": "description" }]);
        let mut event = Event::new("1")
            .with_description("Room: 4B")
            .with_location("Cafeteria");
        apply(build_unified, section, &mut event);
        assert_eq!(event.location.as_deref(), Some("Cafeteria"));

        let section = json!([{ "pattern": r"/Room: (\w+)/", "extract_from": "description", "set_if_blank": false }]);
        apply(build_unified, section, &mut event);
        assert_eq!(event.location.as_deref(), Some("4B"));
    }

    #[test]
    fn literal_extract_uses_pattern_text() {
        let mut event = Event::new("1").with_summary("Offsite at HQ");
        apply(
            build_unified,
            json!([{ "pattern": "HQ", "extract_from": "summary" }]),
            &mut event,
        );
        assert_eq!(event.location.as_deref(), Some("HQ"));
    }

    #[test]
    fn empty_rule_lists_build_nothing() {
        assert!(build_unified(&json!([])).unwrap().is_empty());
        assert!(build_match_only(&json!([{ "location": "x" }])).unwrap().is_empty());
    }
}
