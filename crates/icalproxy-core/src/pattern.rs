//! Literal-or-regex values used by filter rules and transformers.
//!
//! A configured pattern is resolved once, when the configuration is compiled:
//! strings written as `/body/flags` (or any string when `regex = true` is set)
//! become a [`Pattern::Regex`], everything else a [`Pattern::Literal`].

use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::warn;

/// Errors produced while compiling a pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unsupported regex flag {flag:?} in {pattern:?}")]
    UnknownFlag { pattern: String, flag: char },

    #[error("unterminated regex literal {0:?}")]
    Unterminated(String),
}

/// A matcher resolved at configuration time.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Plain substring.
    Literal(String),
    /// Compiled regular expression, plus the same body anchored to the
    /// whole value.
    Regex { re: Regex, whole: Regex },
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Regex { re: a, .. }, Self::Regex { re: b, .. }) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl Pattern {
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// Compiles `text`, failing on an invalid regex.
    ///
    /// `force_regex` treats a string without slashes as a regex body.
    pub fn parse(text: &str, force_regex: bool) -> Result<Self, PatternError> {
        let trimmed = text.trim();
        if trimmed.starts_with('/') {
            return compile_delimited(trimmed);
        }
        if force_regex {
            return compile(text, text, "");
        }
        Ok(Self::Literal(text.to_string()))
    }

    /// Like [`Pattern::parse`], but an invalid regex degrades to a literal.
    pub fn parse_lenient(text: &str, force_regex: bool) -> Self {
        match Self::parse(text, force_regex) {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!(pattern = %text, error = %e, "falling back to literal pattern");
                Self::Literal(text.to_string())
            }
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, Self::Regex { .. })
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        match self {
            Self::Literal(needle) => haystack.contains(needle.as_str()),
            Self::Regex { re, .. } => re.is_match(haystack),
        }
    }

    /// Whole-value equality for literals, anchored full match for regexes.
    pub fn matches_whole(&self, haystack: &str) -> bool {
        match self {
            Self::Literal(needle) => haystack == needle,
            Self::Regex { whole, .. } => whole.is_match(haystack),
        }
    }

    /// Text of capture `group` of the first match.
    ///
    /// A literal has no groups; when it occurs in `haystack` its own text is
    /// returned for any group.
    pub fn capture(&self, haystack: &str, group: usize) -> Option<String> {
        match self {
            Self::Literal(needle) => haystack.contains(needle.as_str()).then(|| needle.clone()),
            Self::Regex { re, .. } => re
                .captures(haystack)
                .and_then(|caps| caps.get(group))
                .map(|m| m.as_str().to_string()),
        }
    }

    /// Replaces every match with `replacement`.
    ///
    /// For regexes, `\1`-style back-references are expanded and `$` is literal.
    pub fn replace_all(&self, haystack: &str, replacement: &str) -> String {
        match self {
            Self::Literal(needle) if needle.is_empty() => haystack.to_string(),
            Self::Literal(needle) => haystack.replace(needle.as_str(), replacement),
            Self::Regex { re, .. } => re
                .replace_all(haystack, backrefs_to_regex(replacement).as_str())
                .into_owned(),
        }
    }
}

fn compile_delimited(text: &str) -> Result<Pattern, PatternError> {
    let Some(close) = text.rfind('/').filter(|&idx| idx > 0) else {
        return Err(PatternError::Unterminated(text.to_string()));
    };
    compile(text, &text[1..close], &text[close + 1..])
}

/// `^` and `$` always match at line boundaries; `m` makes `.` cross them.
fn compile(source: &str, body: &str, flags: &str) -> Result<Pattern, PatternError> {
    let (mut case_insensitive, mut dot_all, mut extended) = (false, false, false);
    for flag in flags.chars() {
        match flag {
            'i' => case_insensitive = true,
            'm' => dot_all = true,
            'x' => extended = true,
            other => {
                return Err(PatternError::UnknownFlag {
                    pattern: source.to_string(),
                    flag: other,
                });
            }
        }
    }

    let build = |expr: &str| {
        RegexBuilder::new(expr)
            .multi_line(true)
            .case_insensitive(case_insensitive)
            .dot_matches_new_line(dot_all)
            .ignore_whitespace(extended)
            .build()
            .map_err(|source_err| PatternError::InvalidRegex {
                pattern: source.to_string(),
                source: source_err,
            })
    };

    let re = build(body)?;
    // A trailing `#` comment in extended mode must not swallow the anchor.
    let close = if extended { "\n)\\z" } else { ")\\z" };
    let whole = build(&format!("\\A(?:{}{}", body, close))?;
    Ok(Pattern::Regex { re, whole })
}

/// Rewrites `\N` back-references to `${N}` and escapes `$`.
fn backrefs_to_regex(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut digits = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        digits.push(d);
                        chars.next();
                    }
                    out.push_str("${");
                    out.push_str(&digits);
                    out.push('}');
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                _ => out.push('\\'),
            },
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_strings_are_literals() {
        let pattern = Pattern::parse("Lunch", false).unwrap();
        assert_eq!(pattern, Pattern::literal("Lunch"));
        assert!(pattern.is_match("Team Lunch"));
        assert!(!pattern.is_match("team lunch"));
    }

    #[test]
    fn delimited_with_flags() {
        let pattern = Pattern::parse("/foo.*/i", false).unwrap();
        assert!(pattern.is_regex());
        assert!(pattern.is_match("FOOBAR"));

        let dotall = Pattern::parse("/a.b/m", false).unwrap();
        assert!(dotall.is_match("a\nb"));
    }

    #[test]
    fn anchors_match_at_line_boundaries() {
        let pattern = Pattern::parse("/^Standup$/", false).unwrap();
        assert!(pattern.is_match("Agenda\nStandup\nNotes"));
        assert_eq!(
            Pattern::parse(r"/^Room (\w+)$/", false)
                .unwrap()
                .capture("Call\nRoom B12", 1)
                .as_deref(),
            Some("B12")
        );
    }

    #[test]
    fn forced_regex_without_slashes() {
        let pattern = Pattern::parse(r"^\d+$", true).unwrap();
        assert!(pattern.is_match("1234"));
    }

    #[test]
    fn invalid_regex_is_an_error_or_literal() {
        assert!(matches!(
            Pattern::parse("/(unclosed/", false),
            Err(PatternError::InvalidRegex { .. })
        ));
        assert!(matches!(
            Pattern::parse("/abc/q", false),
            Err(PatternError::UnknownFlag { flag: 'q', .. })
        ));
        assert!(matches!(
            Pattern::parse("/abc", false),
            Err(PatternError::Unterminated(_))
        ));
        assert_eq!(
            Pattern::parse_lenient("/(unclosed/", false),
            Pattern::literal("/(unclosed/")
        );
    }

    #[test]
    fn whole_value_matching() {
        let re = Pattern::parse("/stand.?up/i", false).unwrap();
        assert!(re.matches_whole("Standup"));
        assert!(!re.matches_whole("Daily standup"));
        assert!(Pattern::literal("a").matches_whole("a"));

        let alternation = Pattern::parse("/a|ab/", false).unwrap();
        assert!(alternation.matches_whole("ab"));
        assert!(alternation.matches_whole("a"));
        assert!(!alternation.matches_whole("abc"));

        let anchored = Pattern::parse("/^Standup$/", false).unwrap();
        assert!(!anchored.matches_whole("Standup\nnotes"));

        let commented = Pattern::parse("/stand # trailing comment/x", false).unwrap();
        assert!(commented.matches_whole("stand"));
        assert!(!Pattern::literal("a").matches_whole("ab"));
    }

    #[test]
    fn captures() {
        let re = Pattern::parse(r"/Room:\s*(\w+)/", false).unwrap();
        assert_eq!(re.capture("Meet in Room: B12", 1).as_deref(), Some("B12"));
        assert_eq!(re.capture("Meet in Room: B12", 2), None);
        assert_eq!(re.capture("no room", 1), None);
        let lit = Pattern::literal("HQ");
        assert_eq!(lit.capture("at HQ today", 1).as_deref(), Some("HQ"));
    }

    #[test]
    fn replacement_backrefs() {
        let re = Pattern::parse(r"/(\w+) sync/", false).unwrap();
        assert_eq!(re.replace_all("team sync", r"sync: \1"), "sync: team");
        assert_eq!(re.replace_all("team sync", "$5"), "$5");
        let lit = Pattern::literal("Foo");
        assert_eq!(lit.replace_all("Foo and Foo", "Bar"), "Bar and Bar");
    }
}
