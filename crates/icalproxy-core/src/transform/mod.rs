//! Event transformers and the registry that builds them from configuration.
//!
//! A [`TransformerRegistry`] maps configuration keys to factories. It is
//! assembled once at startup through [`TransformerRegistry::builder`] and is
//! immutable afterwards. Building a [`TransformPipeline`] walks the registered
//! keys in registration order and hands each configured section to its factory.
//!
//! # Example
//!
//! ```ignore
//! use icalproxy_core::transform::TransformerRegistry;
//!
//! let registry = TransformerRegistry::builtin();
//! let pipeline = registry.build(&calendar.transformations);
//! for event in &mut events {
//!     pipeline.apply(event);
//! }
//! ```

mod location;
mod rename;
mod uppercase;

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::event::{Event, GeoPoint, TextField};
use crate::pattern::Pattern;

pub use location::{LocationMode, LocationRule, LocationRules};
pub use rename::Rename;
pub use uppercase::UppercaseSummary;

/// A configuration section a factory could not use.
#[derive(Debug, Error)]
#[error("invalid `{key}` section: {message}")]
pub struct TransformError {
    pub key: &'static str,
    pub message: String,
}

impl TransformError {
    pub fn new(key: &'static str, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
        }
    }
}

/// A mutation applied to every event that passed the filters.
pub trait Transformer: Send + Sync + fmt::Debug {
    /// Registry key this transformer was built from.
    fn name(&self) -> &'static str;

    fn apply(&self, event: &mut Event);
}

/// Turns a configuration section into zero or more transformers.
pub type TransformerFactory = fn(&Value) -> Result<Vec<Box<dyn Transformer>>, TransformError>;

/// Ordered key to factory table.
#[derive(Clone, Default)]
pub struct TransformerRegistry {
    entries: Vec<(String, TransformerFactory)>,
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

/// Collects registrations before the registry is frozen.
#[derive(Default)]
pub struct TransformerRegistryBuilder {
    entries: Vec<(String, TransformerFactory)>,
}

impl TransformerRegistryBuilder {
    /// Registers `factory` under `key`. Registering a key again replaces the
    /// factory but keeps the original position.
    pub fn register(mut self, key: impl Into<String>, factory: TransformerFactory) -> Self {
        let key = key.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = factory,
            None => self.entries.push((key, factory)),
        }
        self
    }

    pub fn build(self) -> TransformerRegistry {
        TransformerRegistry {
            entries: self.entries,
        }
    }
}

impl TransformerRegistry {
    pub fn builder() -> TransformerRegistryBuilder {
        TransformerRegistryBuilder::default()
    }

    /// The compiled-in transformers, in their fixed order.
    pub fn builtin() -> Self {
        let builder = Self::builder();
        let builder = rename::register(builder);
        let builder = location::register(builder);
        uppercase::register(builder).build()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == key)
    }

    /// Builds the transformers configured in `sections`.
    ///
    /// A failing factory is logged and contributes nothing.
    pub fn build(&self, sections: &Map<String, Value>) -> TransformPipeline {
        let mut transformers = Vec::new();
        for (key, factory) in &self.entries {
            let Some(section) = sections.get(key) else {
                continue;
            };
            match factory(section) {
                Ok(built) => {
                    debug!(key = %key, count = built.len(), "built transformers");
                    transformers.extend(built);
                }
                Err(e) => warn!(key = %key, error = %e, "transformer factory failed, skipping"),
            }
        }
        for key in sections.keys().filter(|key| !self.contains(key)) {
            debug!(key = %key, "no transformer registered for key");
        }
        TransformPipeline { transformers }
    }
}

/// Transformers in application order.
#[derive(Debug, Default)]
pub struct TransformPipeline {
    transformers: Vec<Box<dyn Transformer>>,
}

impl TransformPipeline {
    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.transformers.iter().map(|t| t.name()).collect()
    }

    pub fn apply(&self, event: &mut Event) {
        for transformer in &self.transformers {
            transformer.apply(event);
        }
    }
}

// Section parsing helpers shared by the built-in factories.

/// A section given either as a list of objects or as a single object.
fn rule_objects<'a>(
    key: &'static str,
    section: &'a Value,
) -> Result<Vec<&'a Map<String, Value>>, TransformError> {
    match section {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_object()
                    .ok_or_else(|| TransformError::new(key, "rules must be tables"))
            })
            .collect(),
        Value::Object(map) => Ok(vec![map]),
        Value::Null => Ok(Vec::new()),
        _ => Err(TransformError::new(key, "expected a list of rules")),
    }
}

/// First string value among `keys`.
fn first_str<'a>(rule: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| rule.get(*k)).and_then(Value::as_str)
}

/// Ruby-like truthiness: everything except `false` and null.
fn truthy(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null) | Some(Value::Bool(false)))
}

/// Compiles the rule's `pattern`, honoring `regex = true`.
fn rule_pattern(text: &str, rule: &Map<String, Value>) -> Pattern {
    let force_regex = rule.get("regex").and_then(Value::as_bool).unwrap_or(false);
    Pattern::parse_lenient(text, force_regex)
}

/// Field list given as one name or a list of names; unknown names are dropped.
fn text_fields(value: Option<&Value>) -> Vec<TextField> {
    match value {
        Some(Value::String(name)) => TextField::parse(name).into_iter().collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(TextField::parse)
            .collect(),
        _ => Vec::new(),
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `geo = { lat, lon }` or flat `lat` / `lon` keys.
fn rule_geo(rule: &Map<String, Value>) -> Option<GeoPoint> {
    let source = rule.get("geo").and_then(Value::as_object).unwrap_or(rule);
    Some(GeoPoint::new(
        number(source.get("lat"))?,
        number(source.get("lon"))?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Suffix(&'static str);

    impl Transformer for Suffix {
        fn name(&self) -> &'static str {
            "suffix"
        }

        fn apply(&self, event: &mut Event) {
            let summary = format!("{}{}", event.text(TextField::Summary), self.0);
            event.set_text(TextField::Summary, summary);
        }
    }

    fn suffix_a(_: &Value) -> Result<Vec<Box<dyn Transformer>>, TransformError> {
        Ok(vec![Box::new(Suffix("-a"))])
    }

    fn suffix_b(_: &Value) -> Result<Vec<Box<dyn Transformer>>, TransformError> {
        Ok(vec![Box::new(Suffix("-b")), Box::new(Suffix("-c"))])
    }

    fn failing(_: &Value) -> Result<Vec<Box<dyn Transformer>>, TransformError> {
        Err(TransformError::new("failing", "boom"))
    }

    fn sections(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn builtin_order() {
        let registry = TransformerRegistry::builtin();
        let keys: Vec<&str> = registry.keys().collect();
        assert_eq!(keys, ["rename", "location_rules", "location", "uppercase_summary"]);
    }

    #[test]
    fn registration_order_drives_application() {
        let registry = TransformerRegistry::builder()
            .register("b", suffix_b)
            .register("a", suffix_a)
            .build();
        let config = sections(json!({"a": true, "b": true}));

        let mut first = Event::new("x").with_summary("S");
        registry.build(&config).apply(&mut first);
        assert_eq!(first.summary.as_deref(), Some("S-b-c-a"));

        let mut second = Event::new("x").with_summary("S");
        registry.build(&config).apply(&mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn re_registering_keeps_position() {
        let registry = TransformerRegistry::builder()
            .register("a", suffix_a)
            .register("b", suffix_b)
            .register("a", suffix_b)
            .build();
        let keys: Vec<&str> = registry.keys().collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn failing_factory_contributes_nothing() {
        let registry = TransformerRegistry::builder()
            .register("failing", failing)
            .register("a", suffix_a)
            .build();
        let pipeline = registry.build(&sections(json!({"failing": {}, "a": 1, "unknown": 2})));
        assert_eq!(pipeline.names(), ["suffix"]);
    }

    #[test]
    fn unconfigured_keys_build_nothing() {
        let pipeline = TransformerRegistry::builtin().build(&Map::new());
        assert!(pipeline.is_empty());
    }

    #[test]
    fn helpers() {
        assert!(truthy(Some(&json!(0))));
        assert!(!truthy(Some(&json!(false))));
        assert!(!truthy(None));
        assert_eq!(
            text_fields(Some(&json!(["summary", "nope", "location"]))),
            [TextField::Summary, TextField::Location]
        );
        let flat = sections(json!({"lat": "48.85", "lon": 2.35}));
        assert_eq!(rule_geo(&flat), Some(GeoPoint::new(48.85, 2.35)));
        let nested = sections(json!({"geo": {"lat": 1.0}}));
        assert_eq!(rule_geo(&nested), None);
    }
}
