//! `geoprox` - CLI for the proximity index
//!
//! This binary records positions, answers nearby queries, and runs the
//! background expiry sweeper against the configured backend.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use geoprox::cli::{
    Cli, Command, ConfigCommand, LocateCommand, NearbyCommand, OutputFormat, RunCommand,
    UpdateCommand,
};
use geoprox::config::Backend;
use geoprox::{
    init_logging, open_index, Config, LocationService, QueryDefaults, Sweeper, SystemClock,
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    // Execute the command
    match cli.command {
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
        Command::Run(run_cmd) => handle_run(&config, &run_cmd),
        Command::Update(cmd) => handle_update(&open_one_shot(&config)?, &cmd),
        Command::Nearby(cmd) => handle_nearby(&open_one_shot(&config)?, &cmd),
        Command::Remove(cmd) => {
            open_one_shot(&config)?.remove(&cmd.identity)?;
            println!("Removed {}", cmd.identity);
            Ok(())
        }
        Command::Locate(cmd) => handle_locate(&open_one_shot(&config)?, &cmd),
        Command::Sweep => {
            let removed = open_one_shot(&config)?.sweep()?;
            println!("Removed {removed} expired points");
            Ok(())
        }
        Command::Status(cmd) => handle_status(&config, &open_one_shot(&config)?, cmd.json),
    }
}

/// Open the index for a command that exits when it is done.
fn open_one_shot(config: &Config) -> anyhow::Result<LocationService> {
    if config.index.backend == Backend::Memory {
        warn!("The memory backend does not persist between invocations");
    }
    open_service(config)
}

fn open_service(config: &Config) -> anyhow::Result<LocationService> {
    let index = open_index(config, Arc::new(SystemClock))
        .with_context(|| format!("failed to open {} index", config.index.backend))?;
    Ok(LocationService::new(index, QueryDefaults::from(&config.index)))
}

fn handle_update(service: &LocationService, cmd: &UpdateCommand) -> anyhow::Result<()> {
    let point = service.update(&cmd.identity, cmd.latitude, cmd.longitude)?;
    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&point)?);
    } else {
        println!(
            "Updated {} at {} ({})",
            point.identity,
            point.coordinate,
            point.updated_at.to_rfc3339()
        );
    }
    Ok(())
}

fn handle_nearby(service: &LocationService, cmd: &NearbyCommand) -> anyhow::Result<()> {
    let neighbors = service.nearby(&cmd.query())?;

    match cmd.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&neighbors)?);
        }
        OutputFormat::Plain => {
            for neighbor in &neighbors {
                println!("{}\t{:.3}", neighbor.identity, neighbor.distance_km);
            }
        }
        OutputFormat::Table => {
            if neighbors.is_empty() {
                println!("No identities near {}", cmd.identity);
                return Ok(());
            }
            let width = neighbors
                .iter()
                .map(|n| n.identity.len())
                .max()
                .unwrap_or(0)
                .max("IDENTITY".len());
            println!("{:<width$}  {:>12}", "IDENTITY", "DISTANCE (km)");
            for neighbor in &neighbors {
                println!(
                    "{:<width$}  {:>12.3}",
                    neighbor.identity, neighbor.distance_km
                );
            }
        }
    }
    Ok(())
}

fn handle_locate(service: &LocationService, cmd: &LocateCommand) -> anyhow::Result<()> {
    let Some(point) = service.locate(&cmd.identity)? else {
        anyhow::bail!("no live position for {}", cmd.identity);
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&point)?);
    } else {
        println!("Identity:   {}", point.identity);
        println!("Position:   {}", point.coordinate);
        println!("Updated:    {}", point.updated_at.to_rfc3339());
    }
    Ok(())
}

fn handle_status(config: &Config, service: &LocationService, json: bool) -> anyhow::Result<()> {
    let stats = service.stats()?;

    if json {
        let status = serde_json::json!({
            "backend": stats.backend,
            "database_path": (config.index.backend == Backend::Sqlite)
                .then(|| config.database_path()),
            "ttl_secs": config.index.ttl_secs,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("geoprox status");
        println!("--------------");
        println!("Backend:       {}", stats.backend);
        if config.index.backend == Backend::Sqlite {
            println!("Database:      {}", config.database_path().display());
        }
        println!("TTL:           {}s", config.index.ttl_secs);
        println!("Points:        {}", stats.total_points);
        println!("  Live:        {}", stats.live_points);
        println!("  Stale:       {}", stats.stale_points);
        if let Some(oldest) = stats.oldest_update {
            println!("Oldest update: {}", oldest.to_rfc3339());
        }
        if let Some(newest) = stats.newest_update {
            println!("Newest update: {}", newest.to_rfc3339());
        }
    }
    Ok(())
}

fn handle_run(config: &Config, cmd: &RunCommand) -> anyhow::Result<()> {
    let service = open_service(config)?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;

    runtime.block_on(async {
        let sweeper = if config.sweep.enabled && !cmd.no_sweep {
            let sweeper = Sweeper::new(Arc::clone(service.index()), config.sweep_interval());
            Some(sweeper.spawn())
        } else {
            info!("Background sweeping disabled");
            None
        };

        info!(
            "Serving {} index; press Ctrl-C to stop",
            service.index().backend_name()
        );
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        info!("Shutting down");

        if let Some((handle, task)) = sweeper {
            handle.stop();
            match task.await {
                Ok(report) => info!(
                    "Sweeper ran {} passes, removed {} points, {} failures",
                    report.passes, report.removed, report.failures
                ),
                Err(e) => warn!("Sweeper task failed: {}", e),
            }
        }
        Ok(())
    })
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
                println!("[Index]");
                println!("  Backend:            {}", config.index.backend);
                println!("  TTL (secs):         {}", config.index.ttl_secs);
                println!("  Default radius km:  {}", config.index.default_radius_km);
                println!("  Default limit:      {}", config.index.default_limit);
                println!("  Max limit:          {}", config.index.max_limit);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Sweep]");
                println!("  Enabled:            {}", config.sweep.enabled);
                println!("  Interval (secs):    {}", config.sweep.interval_secs);
                println!("  Batch size:         {}", config.sweep.batch_size);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            // An explicit file must exist; the default path may be absent.
            let result = match &file {
                Some(path) => {
                    println!("Validating configuration: {}", path.display());
                    Config::load_file(path)
                }
                None => {
                    let path = Config::default_config_path();
                    println!("Validating configuration: {}", path.display());
                    Config::load_from(Some(path))
                }
            };
            result.context("configuration is invalid")?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}
