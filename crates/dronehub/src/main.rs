//! `dronehub` - CLI for the drone registry service
//!
//! This binary runs the HTTP API and provides maintenance commands for the
//! underlying database.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use dronehub::cli::{Cli, Command, ConfigCommand, PruneCommand, ServeCommand};
use dronehub::{init_logging, server, AppState, Config, Storage, TelemetryLog};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    // Execute the command
    match cli.command {
        Command::Serve(serve_cmd) => handle_serve(config, serve_cmd),
        Command::Status(status_cmd) => handle_status(&config, status_cmd.json),
        Command::Prune(prune_cmd) => handle_prune(&config, &prune_cmd),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open_with_timeout(&path, config.busy_timeout())
        .with_context(|| format!("failed to open database at {}", path.display()))
}

fn handle_serve(mut config: Config, cmd: ServeCommand) -> anyhow::Result<()> {
    if let Some(host) = cmd.host {
        config.server.host = host;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    config.validate()?;

    let storage = Arc::new(open_storage(&config)?);
    info!("Using database at {}", storage.path().display());

    let state = AppState::new(storage, config.api);
    let addr = config.server_address();

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(server::run(state, &addr))?;
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats()?;

    if json {
        let status = serde_json::json!({
            "database_path": storage.path(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        let fmt_ts = |ts: Option<chrono::DateTime<chrono::Utc>>| {
            ts.map_or_else(|| "-".to_string(), |t| t.to_rfc3339())
        };
        println!("dronehub status");
        println!("---------------");
        println!("Database:      {}", storage.path().display());
        println!("Size:          {} bytes", stats.db_size_bytes);
        println!("Drones:        {}", stats.total_drones);
        println!("Readings:      {}", stats.total_readings);
        println!("Oldest:        {}", fmt_ts(stats.oldest_reading));
        println!("Newest:        {}", fmt_ts(stats.newest_reading));
    }
    Ok(())
}

fn handle_prune(config: &Config, cmd: &PruneCommand) -> anyhow::Result<()> {
    let storage = Arc::new(open_storage(config)?);
    let log = TelemetryLog::new(storage);

    let removed = log.prune_older_than(chrono::Duration::days(i64::from(cmd.older_than_days)))?;
    println!(
        "Removed {removed} readings older than {} days.",
        cmd.older_than_days
    );
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Host:               {}", config.server.host);
                println!("  Port:               {}", config.server.port);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Busy timeout (ms):  {}", config.storage.busy_timeout_ms);
                println!();
                println!("[API]");
                println!("  Default page size:  {}", config.api.default_page_size);
                println!("  Max page size:      {}", config.api.max_page_size);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
