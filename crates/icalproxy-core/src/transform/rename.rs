//! `rename`: rewrites the summary when a pattern matches.

use serde_json::Value;

use super::{
    TransformError, Transformer, TransformerRegistryBuilder, first_str, rule_objects, rule_pattern,
    text_fields, truthy,
};
use crate::event::{Event, TextField};
use crate::pattern::Pattern;

const KEY: &str = "rename";

/// Substitutes the matched span in the summary, or overwrites the whole
/// summary when `set_on_match` is enabled.
#[derive(Debug, Clone)]
pub struct Rename {
    pattern: Pattern,
    replacement: String,
    search_in: Vec<TextField>,
    set_on_match: bool,
    capture_group: Option<usize>,
}

impl Rename {
    pub fn new(pattern: Pattern, replacement: impl Into<String>) -> Self {
        Self {
            pattern,
            replacement: replacement.into(),
            search_in: vec![TextField::Summary],
            set_on_match: false,
            capture_group: None,
        }
    }

    /// Fields checked for a match; an empty list means summary and description.
    pub fn with_search_in(mut self, fields: Vec<TextField>) -> Self {
        self.search_in = fields;
        self
    }

    pub fn with_set_on_match(mut self, set_on_match: bool) -> Self {
        self.set_on_match = set_on_match;
        self
    }

    pub fn with_capture_group(mut self, group: Option<usize>) -> Self {
        self.capture_group = group;
        self
    }

    fn from_rule(rule: &serde_json::Map<String, Value>) -> Option<Self> {
        let pattern_text = first_str(rule, &["pattern", "match", "matches"])?;
        let replacement = ["replace", "replacement", "to"]
            .iter()
            .find_map(|k| rule.get(*k))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .unwrap_or_default();

        let search_in = match ["search_in", "search", "in"].iter().find_map(|k| rule.get(*k)) {
            Some(value) => text_fields(Some(value)),
            None => vec![TextField::Summary],
        };

        let capture_group = ["capture_group", "capture"]
            .iter()
            .find_map(|k| rule.get(*k))
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .or_else(|| truthy(rule.get("use_capture")).then_some(1));

        let set_on_match = match rule.get("set_on_match") {
            Some(value) => truthy(Some(value)),
            None => rule.contains_key("to") || truthy(rule.get("normalize")) || capture_group.is_some(),
        };

        Some(
            Self::new(rule_pattern(pattern_text, rule), replacement)
                .with_search_in(search_in)
                .with_set_on_match(set_on_match)
                .with_capture_group(capture_group),
        )
    }

    /// Looks for the first matching field; returns the capture, if any was requested.
    fn find_match(&self, event: &Event) -> Option<Option<String>> {
        let fields: &[TextField] = if self.search_in.is_empty() {
            &[TextField::Summary, TextField::Description]
        } else {
            &self.search_in
        };

        fields.iter().find_map(|&field| {
            let value = event.text(field);
            if value.is_empty() || !self.pattern.is_match(value) {
                return None;
            }
            let captured = match (&self.pattern, self.capture_group) {
                (Pattern::Regex { .. }, Some(group)) => self.pattern.capture(value, group),
                _ => None,
            };
            Some(captured)
        })
    }
}

impl Transformer for Rename {
    fn name(&self) -> &'static str {
        KEY
    }

    fn apply(&self, event: &mut Event) {
        let Some(captured) = self.find_match(event) else {
            return;
        };

        if self.set_on_match {
            let summary = captured
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| self.replacement.clone());
            event.set_text(TextField::Summary, summary);
            return;
        }

        let current = event.text(TextField::Summary);
        if current.is_empty() {
            return;
        }
        let renamed = self.pattern.replace_all(current, &self.replacement);
        event.set_text(TextField::Summary, renamed);
    }
}

fn build(section: &Value) -> Result<Vec<Box<dyn Transformer>>, TransformError> {
    Ok(rule_objects(KEY, section)?
        .into_iter()
        .filter_map(Rename::from_rule)
        .map(|rename| Box::new(rename) as Box<dyn Transformer>)
        .collect())
}

pub(super) fn register(builder: TransformerRegistryBuilder) -> TransformerRegistryBuilder {
    builder.register(KEY, build)
}
