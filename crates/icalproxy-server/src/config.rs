//! Proxy configuration.
//!
//! Everything lives in a single TOML file, `~/.config/icalproxy/config.toml`
//! by default:
//!
//! ```toml
//! storage = "sqlite:///var/lib/icalproxy/proxy.db"
//! fetch_timeout_secs = 30
//!
//! [calendars.work]
//! ical_url = "https://example.com/work.ics"
//! api_key = "${ICAL_PROXY_WORK_KEY}"
//! ```
//!
//! `${ICAL_PROXY_*}` placeholders are replaced from the environment before
//! parsing; unset variables become empty strings. Files without a
//! `[calendars]` table use the legacy layout where every other top-level
//! table is a calendar.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use icalproxy_core::CalendarConfig;
use regex::{Captures, Regex};
use toml::{Table, Value};
use tracing::debug;

use crate::error::{ServerError, ServerResult};

/// Environment variables that may be referenced from the file.
pub const ENV_PLACEHOLDER: &str = r"\$\{(ICAL_PROXY_[^}]+)\}";

/// Top-level keys that are never calendars in the legacy layout.
const RESERVED_KEYS: &[&str] = &["storage", "fetch_timeout_secs", "calendars"];

/// The statically configured part of the proxy.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    /// Storage connection string, see `icalproxy_store::StorageKind`.
    pub storage: Option<String>,

    /// Feed fetch timeout; unset uses the fetcher default.
    pub fetch_timeout_secs: Option<u64>,

    /// Calendars defined in the file, by name.
    pub calendars: BTreeMap<String, CalendarConfig>,

    /// The file this configuration was read from.
    pub path: Option<PathBuf>,
}

impl ProxyConfig {
    /// Loads the default file, or an empty configuration if it does not exist.
    pub fn load() -> ServerResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::parse(&content)?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parses file content, resolving placeholders from the process environment.
    pub fn parse(content: &str) -> ServerResult<Self> {
        Self::parse_with(content, |name| std::env::var(name).ok())
    }

    /// Parses file content, resolving placeholders through `lookup`.
    pub fn parse_with(content: &str, lookup: impl Fn(&str) -> Option<String>) -> ServerResult<Self> {
        let content = substitute_env(content, lookup)?;
        let table: Table = toml::from_str(&content)
            .map_err(|e| ServerError::config(format!("failed to parse config: {}", e)))?;

        let storage = match table.get("storage") {
            None => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(ServerError::config("`storage` must be a string")),
        };
        let fetch_timeout_secs = match table.get("fetch_timeout_secs") {
            None => None,
            Some(Value::Integer(n)) if *n >= 0 => Some(*n as u64),
            Some(_) => {
                return Err(ServerError::config(
                    "`fetch_timeout_secs` must be a non-negative integer",
                ));
            }
        };

        let sections: Vec<(&String, &Value)> = match table.get("calendars") {
            Some(Value::Table(calendars)) => calendars.iter().collect(),
            Some(_) => return Err(ServerError::config("`calendars` must be a table")),
            None => table
                .iter()
                .filter(|(key, value)| {
                    !RESERVED_KEYS.contains(&key.as_str()) && value.is_table()
                })
                .collect(),
        };

        let mut calendars = BTreeMap::new();
        for (name, section) in sections {
            let config: CalendarConfig = section
                .clone()
                .try_into()
                .map_err(|e| ServerError::config(format!("calendar `{}`: {}", name, e)))?;
            calendars.insert(name.clone(), config);
        }

        Ok(Self {
            storage,
            fetch_timeout_secs,
            calendars,
            path: None,
        })
    }

    /// Builder: add a calendar.
    pub fn with_calendar(mut self, name: impl Into<String>, config: CalendarConfig) -> Self {
        self.calendars.insert(name.into(), config);
        self
    }

    /// Builder: set the storage connection string.
    pub fn with_storage(mut self, storage: impl Into<String>) -> Self {
        self.storage = Some(storage.into());
        self
    }

    /// Whether `name` is defined in the file.
    pub fn is_static(&self, name: &str) -> bool {
        self.calendars.contains_key(name)
    }

    /// The storage connection string: `explicit` (command line or
    /// environment), then the file's `storage` key, then a JSON document
    /// next to the configuration file.
    pub fn storage_uri(&self, explicit: Option<&str>) -> String {
        if let Some(uri) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
            return uri.to_string();
        }
        if let Some(uri) = &self.storage {
            return uri.clone();
        }
        let dir = self
            .path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_dir);
        format!("json://{}", dir.display())
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("icalproxy")
    }
}

/// Replaces `${ICAL_PROXY_*}` placeholders; unknown variables become empty.
pub fn substitute_env(content: &str, lookup: impl Fn(&str) -> Option<String>) -> ServerResult<String> {
    let pattern = Regex::new(ENV_PLACEHOLDER)
        .map_err(|e| ServerError::config(format!("invalid placeholder pattern: {}", e)))?;
    Ok(pattern
        .replace_all(content, |caps: &Captures<'_>| lookup(&caps[1]).unwrap_or_default())
        .into_owned())
}
