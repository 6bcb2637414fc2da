//! Command-line interface for geoprox.
//!
//! This module provides the CLI structure for the `geoprox` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, LocateCommand, NearbyCommand, OutputFormat, RemoveCommand, RunCommand,
    StatusCommand, UpdateCommand,
};

/// geoprox - Who is near me?
///
/// Maintains the last-known position of each identity and answers radius
/// queries around any of them. Positions expire after a configurable TTL.
#[derive(Debug, Parser)]
#[command(name = "geoprox")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record the current position of an identity
    Update(UpdateCommand),

    /// List identities near another identity
    Nearby(NearbyCommand),

    /// Forget the position of an identity
    Remove(RemoveCommand),

    /// Show the stored position of an identity
    Locate(LocateCommand),

    /// Purge expired positions now
    Sweep,

    /// Show index status
    Status(StatusCommand),

    /// Keep the index open and sweep expired positions until interrupted
    Run(RunCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn status_cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "geoprox");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_levels() {
        use crate::logging::Verbosity;

        assert_eq!(status_cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(status_cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(status_cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(status_cli(3, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_update_with_negative_longitude() {
        let cli =
            Cli::try_parse_from(["geoprox", "update", "alice", "37.7749", "-122.4194"]).unwrap();
        match cli.command {
            Command::Update(cmd) => {
                assert_eq!(cmd.identity, "alice");
                assert!((cmd.latitude - 37.7749).abs() < f64::EPSILON);
                assert!((cmd.longitude + 122.4194).abs() < f64::EPSILON);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_update_with_negative_latitude() {
        let cli = Cli::try_parse_from(["geoprox", "update", "bob", "-33.86", "151.2"]).unwrap();
        assert!(matches!(cli.command, Command::Update(_)));
    }

    #[test]
    fn test_parse_nearby_defaults() {
        let cli = Cli::try_parse_from(["geoprox", "nearby", "alice"]).unwrap();
        match cli.command {
            Command::Nearby(cmd) => {
                assert!(cmd.radius.is_none());
                assert!(cmd.limit.is_none());
                assert_eq!(cmd.format, OutputFormat::Table);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_nearby_with_options() {
        let cli = Cli::try_parse_from([
            "geoprox", "nearby", "alice", "-r", "20", "-l", "5", "-f", "json",
        ])
        .unwrap();
        match cli.command {
            Command::Nearby(cmd) => {
                assert_eq!(cmd.radius, Some(20.0));
                assert_eq!(cmd.limit, Some(5));
                assert_eq!(cmd.format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_remove() {
        let cli = Cli::try_parse_from(["geoprox", "remove", "carol"]).unwrap();
        assert!(matches!(cli.command, Command::Remove(ref cmd) if cmd.identity == "carol"));
    }

    #[test]
    fn test_parse_sweep_and_run() {
        let cli = Cli::try_parse_from(["geoprox", "sweep"]).unwrap();
        assert!(matches!(cli.command, Command::Sweep));

        let cli = Cli::try_parse_from(["geoprox", "run", "--no-sweep"]).unwrap();
        assert!(matches!(cli.command, Command::Run(RunCommand { no_sweep: true })));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = Cli::try_parse_from(["geoprox", "-c", "/custom/config.toml", "status"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose_and_quiet() {
        let cli = Cli::try_parse_from(["geoprox", "-vv", "status"]).unwrap();
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["geoprox", "-q", "status"]).unwrap();
        assert!(cli.quiet);
    }
}
