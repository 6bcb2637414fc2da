//! Error types for geoprox.
//!
//! This module defines all error types used throughout the geoprox crate,
//! along with an [`ErrorKind`] classification that transport layers can map
//! onto their own status codes.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for geoprox operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Validation Errors ===
    /// Latitude or longitude outside the valid geographic range.
    #[error("invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate {
        /// The rejected latitude.
        latitude: f64,
        /// The rejected longitude.
        longitude: f64,
    },

    /// The identity key is empty.
    #[error("invalid identity: must not be empty")]
    InvalidIdentity,

    /// The search radius is negative or not a finite number.
    #[error("invalid radius: {radius_km} km")]
    InvalidRadius {
        /// The rejected radius in kilometers.
        radius_km: f64,
    },

    // === Lookup Errors ===
    /// No live point exists for the identity.
    #[error("no location found for '{identity}'")]
    NotFound {
        /// The identity that was looked up.
        identity: String,
    },

    // === Backend Errors ===
    /// The index backend could not complete the operation.
    #[error("backend unavailable: {message}")]
    BackendUnavailable {
        /// Description of what went wrong.
        message: String,
    },

    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database statement failed.
    #[error("database query failed: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

}

/// A specialized Result type for geoprox operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
///
/// A transport shell maps these onto status codes; the index itself never
/// retries, so `BackendUnavailable` is the only kind a caller may retry
/// verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller supplied invalid input. Fix the input and retry.
    InvalidInput,
    /// The referenced identity has no live point.
    NotFound,
    /// The backend failed; the operation is not assumed to have applied.
    BackendUnavailable,
    /// Configuration could not be loaded or is invalid.
    Configuration,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput => write!(f, "invalid_input"),
            Self::NotFound => write!(f, "not_found"),
            Self::BackendUnavailable => write!(f, "backend_unavailable"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new not-found error.
    #[must_use]
    pub fn not_found(identity: impl Into<String>) -> Self {
        Self::NotFound {
            identity: identity.into(),
        }
    }

    /// Create a new backend-unavailable error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCoordinate { .. } | Self::InvalidIdentity | Self::InvalidRadius { .. } => {
                ErrorKind::InvalidInput
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::BackendUnavailable { .. }
            | Self::DatabaseOpen { .. }
            | Self::Database(_)
            | Self::DatabaseMigration { .. }
            | Self::DirectoryCreate { .. } => ErrorKind::BackendUnavailable,
            Self::ConfigLoad(_) | Self::ConfigValidation { .. } => ErrorKind::Configuration,
        }
    }

    /// Check if this error means the identity has no live point.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if this error was caused by rejected caller input.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        self.kind() == ErrorKind::InvalidInput
    }

    /// Check if this error came from the backend.
    #[must_use]
    pub fn is_backend_unavailable(&self) -> bool {
        self.kind() == ErrorKind::BackendUnavailable
    }
}
