//! Log output for the proxy binaries.
//!
//! Everything logs through `tracing`; [`init_tracing`] installs the one global
//! subscriber. `RUST_LOG` overrides the preset level unless an explicit
//! filter was configured.
//!
//! ```ignore
//! use icalproxy_core::tracing::{init_tracing, TracingConfig, TracingOutputFormat};
//!
//! init_tracing(TracingConfig::cli_debug().with_format(TracingOutputFormat::Json))?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Target prefix shared by every workspace crate.
const TARGET_PREFIX: &str = "icalproxy";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("a tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    Pretty,
    #[default]
    Compact,
    /// One JSON object per line, for log shippers.
    Json,
}

/// Options for [`init_tracing`]. Start from a preset and adjust with the
/// `with_*` methods.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Adds call-site file, line and module path to every line.
    pub verbose: bool,
    /// Compact output only; the other formats always carry a timestamp.
    pub timestamps: bool,
    /// Logs span creation and close, with timings.
    pub span_events: bool,
    /// A full `EnvFilter` directive; ignores both `level` and `RUST_LOG`.
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    /// Warnings only, compact, so command output stays readable.
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: TracingOutputFormat::Compact,
            verbose: false,
            timestamps: true,
            span_events: false,
            filter: None,
        }
    }
}

impl TracingConfig {
    /// `--debug`: every fetch, reconcile and store call.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            verbose: true,
            timestamps: false,
            ..Self::default()
        }
    }

    /// For a proxy running unattended behind a supervisor.
    #[must_use]
    pub fn service() -> Self {
        Self {
            level: Level::INFO,
            format: TracingOutputFormat::Json,
            verbose: true,
            span_events: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(directive) = &self.filter {
            return Ok(EnvFilter::try_new(directive)?);
        }
        let fallback = format!("{}={}", TARGET_PREFIX, self.level);
        Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
    }
}

/// Installs the global subscriber. Call once, first thing in `main`.
///
/// # Errors
///
/// [`TracingError::AlreadyInstalled`] on a second call, [`TracingError::Filter`]
/// for an unparsable explicit filter.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.env_filter()?;

    let base = fmt::layer()
        .with_file(config.verbose)
        .with_line_number(config.verbose)
        .with_target(config.verbose)
        .with_span_events(if config.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    let output = match (config.format, config.timestamps) {
        (TracingOutputFormat::Json, _) => base.json().boxed(),
        (TracingOutputFormat::Pretty, _) => base.pretty().boxed(),
        (TracingOutputFormat::Compact, true) => base.compact().boxed(),
        (TracingOutputFormat::Compact, false) => base.compact().without_time().boxed(),
    };

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(filter).with(output),
    )?;
    Ok(())
}
