//! icalproxy CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use icalproxy_core::{TracingConfig, TracingOutputFormat, init_tracing};
use icalproxy_server::{CalendarService, ProxyConfig};

use icalproxy_cli::cli::{CalendarsAction, Cli, Command, ConfigAction};
use icalproxy_cli::commands;
use icalproxy_cli::error::CliResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut tracing = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default()
    };
    if cli.json_logs {
        tracing = tracing.with_format(TracingOutputFormat::Json);
    }
    if let Err(e) = init_tracing(tracing) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    if let Command::Config {
        action: ConfigAction::Path,
    } = cli.command
    {
        return commands::config::path(cli.config.as_deref());
    }

    let config = match cli.config {
        Some(ref path) => ProxyConfig::load_from(path)?,
        None => ProxyConfig::load()?,
    };
    let storage = cli.storage.as_deref();

    if let Command::Config { .. } = cli.command {
        return commands::config::validate(&config, storage);
    }

    let service = CalendarService::open(config, storage).await?;
    match cli.command {
        Command::Render { name, key, output } => {
            commands::calendar::render(&service, &name, key.as_deref(), output.as_deref()).await
        }
        Command::Sync { names } => commands::calendar::sync(&service, &names).await,
        Command::Events { name, view } => {
            commands::calendar::events(&service, &name, view.into()).await
        }
        Command::Preview { name, key } => {
            commands::calendar::preview(&service, &name, key.as_deref()).await
        }
        Command::Calendars { action } => match action {
            CalendarsAction::List => commands::calendars::list(&service).await,
            CalendarsAction::Get { name } => commands::calendars::get(&service, &name).await,
            CalendarsAction::Put { name, file } => {
                commands::calendars::put(&service, &name, &file).await
            }
            CalendarsAction::Delete { name } => commands::calendars::delete(&service, &name).await,
        },
        Command::Config { .. } => Ok(()),
    }
}
