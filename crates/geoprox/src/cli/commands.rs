//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::service::NearbyQuery;

/// Update command arguments.
#[derive(Debug, Args)]
pub struct UpdateCommand {
    /// Identity whose position is reported
    pub identity: String,

    /// Latitude in degrees, -90 to 90
    #[arg(allow_negative_numbers = true)]
    pub latitude: f64,

    /// Longitude in degrees, -180 to 180
    #[arg(allow_negative_numbers = true)]
    pub longitude: f64,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Nearby command arguments.
#[derive(Debug, Args)]
pub struct NearbyCommand {
    /// Identity at the center of the search
    pub identity: String,

    /// Search radius in kilometers (defaults to the configured radius)
    #[arg(short, long)]
    pub radius: Option<f64>,

    /// Maximum number of results (defaults to the configured limit)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl NearbyCommand {
    /// The service query this command describes.
    #[must_use]
    pub fn query(&self) -> NearbyQuery {
        NearbyQuery {
            center: self.identity.clone(),
            radius_km: self.radius,
            limit: self.limit,
        }
    }
}

/// Remove command arguments.
#[derive(Debug, Args)]
pub struct RemoveCommand {
    /// Identity to forget
    pub identity: String,
}

/// Locate command arguments.
#[derive(Debug, Args)]
pub struct LocateCommand {
    /// Identity to look up
    pub identity: String,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Run command arguments.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Do not start the background expiry sweeper
    #[arg(long)]
    pub no_sweep: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Plain);
    }

    #[test]
    fn test_nearby_command_query() {
        let cmd = NearbyCommand {
            identity: "alice".to_string(),
            radius: Some(20.0),
            limit: None,
            format: OutputFormat::Json,
        };
        let query = cmd.query();
        assert_eq!(query.center, "alice");
        assert_eq!(query.radius_km, Some(20.0));
        assert_eq!(query.limit, None);
    }

    #[test]
    fn test_update_command_debug() {
        let cmd = UpdateCommand {
            identity: "alice".to_string(),
            latitude: 1.0,
            longitude: -2.0,
            json: false,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("alice"));
        assert!(debug_str.contains("latitude"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
