//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use icalproxy_server::EventView;

/// icalproxy - a filtering, deletion-aware calendar feed proxy
#[derive(Debug, Parser)]
#[command(name = "icalproxy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "ICAL_PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Storage connection string (json://, sqlite://, postgres://, mysql://)
    #[arg(long, env = "ICAL_PROXY_STORAGE")]
    pub storage: Option<String>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the proxied calendar as iCalendar text
    Render {
        /// Calendar name
        name: String,

        /// Calendar access key
        #[arg(long)]
        key: Option<String>,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Reconcile calendars with their feeds and report what changed
    Sync {
        /// Calendar names; all calendars when omitted
        names: Vec<String>,
    },

    /// List the events of a calendar as JSON
    Events {
        /// Calendar name
        name: String,

        /// Which event set to show
        #[arg(long, value_enum, default_value_t = ViewArg::Union)]
        view: ViewArg,
    },

    /// Show the events a render would emit, as JSON
    Preview {
        /// Calendar name
        name: String,

        /// Calendar access key
        #[arg(long)]
        key: Option<String>,
    },

    /// Calendar configuration commands
    Calendars {
        #[command(subcommand)]
        action: CalendarsAction,
    },

    /// Configuration file commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Calendar configuration actions.
#[derive(Debug, Subcommand)]
pub enum CalendarsAction {
    /// List every calendar and where it is defined
    List,

    /// Show one calendar configuration
    Get {
        /// Calendar name
        name: String,
    },

    /// Create or replace a stored calendar from a JSON or TOML file
    Put {
        /// Calendar name
        name: String,

        /// Configuration file; `.toml` files are read as TOML, anything else as JSON
        #[arg(long, short)]
        file: PathBuf,
    },

    /// Delete a stored calendar
    Delete {
        /// Calendar name
        name: String,
    },
}

/// Configuration file actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show configuration file path
    Path,

    /// Validate configuration
    Validate,
}

/// Event set selector for `events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ViewArg {
    Live,
    Persisted,
    Union,
}

impl From<ViewArg> for EventView {
    fn from(view: ViewArg) -> Self {
        match view {
            ViewArg::Live => EventView::Live,
            ViewArg::Persisted => EventView::Persisted,
            ViewArg::Union => EventView::Union,
        }
    }
}
