//! `uppercase_summary`: the smallest possible transformer.
//!
//! Configured as `uppercase_summary = true`, or with a condition:
//! `uppercase_summary = { when = "/urgent/i" }`.

use serde_json::Value;

use super::{TransformError, Transformer, TransformerRegistryBuilder, rule_pattern, truthy};
use crate::event::{Event, TextField};
use crate::pattern::Pattern;

const KEY: &str = "uppercase_summary";

#[derive(Debug, Clone, Default)]
pub struct UppercaseSummary {
    when: Option<Pattern>,
}

impl UppercaseSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only upper-case summaries matching `pattern`.
    pub fn when(pattern: Pattern) -> Self {
        Self {
            when: Some(pattern),
        }
    }
}

impl Transformer for UppercaseSummary {
    fn name(&self) -> &'static str {
        KEY
    }

    fn apply(&self, event: &mut Event) {
        let summary = event.text(TextField::Summary);
        if self.when.as_ref().is_some_and(|p| !p.is_match(summary)) {
            return;
        }
        let upper = summary.to_uppercase();
        event.set_text(TextField::Summary, upper);
    }
}

fn build(section: &Value) -> Result<Vec<Box<dyn Transformer>>, TransformError> {
    let transformer = match section {
        Value::Object(options) => {
            if options.contains_key("enabled") && !truthy(options.get("enabled")) {
                return Ok(Vec::new());
            }
            match options.get("when") {
                Some(Value::String(text)) => UppercaseSummary::when(rule_pattern(text, options)),
                Some(_) => return Err(TransformError::new(KEY, "`when` must be a pattern string")),
                None => UppercaseSummary::new(),
            }
        }
        Value::Array(_) => return Err(TransformError::new(KEY, "expected a boolean or a table")),
        other if truthy(Some(other)) => UppercaseSummary::new(),
        _ => return Ok(Vec::new()),
    };
    Ok(vec![Box::new(transformer)])
}

pub(super) fn register(builder: TransformerRegistryBuilder) -> TransformerRegistryBuilder {
    builder.register(KEY, build)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(section: Value, summary: &str) -> Option<String> {
        let mut event = Event::new("1").with_summary(summary);
        for t in build(&section).unwrap() {
            t.apply(&mut event);
        }
        event.summary
    }

    #[test]
    fn enabled_flag() {
        assert_eq!(run(json!(true), "standup").as_deref(), Some("STANDUP"));
        assert_eq!(run(json!(false), "standup").as_deref(), Some("standup"));
        assert_eq!(run(json!({ "enabled": false }), "standup").as_deref(), Some("standup"));
    }

    #[test]
    fn conditional() {
        let section = json!({ "when": "/urgent/i" });
        assert_eq!(run(section.clone(), "Urgent fix").as_deref(), Some("URGENT FIX"));
        assert_eq!(run(section, "Routine").as_deref(), Some("Routine"));
    }

    #[test]
    fn invalid_sections() {
        assert!(build(&json!([1, 2])).is_err());
        assert!(build(&json!({ "when": 5 })).is_err());
    }

    #[test]
    fn missing_summary_becomes_empty() {
        let mut event = Event::new("1");
        UppercaseSummary::new().apply(&mut event);
        assert_eq!(event.summary.as_deref(), Some(""));
    }
}
