//! Core error types for blindclock-core.
//!
//! Errors surface only at construction/composition time (opening the
//! store, loading configuration, parsing a schedule file). Runtime
//! failures inside the timer path are handled locally and reduced to a
//! logged warning or a silent default -- they never cross a component
//! boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for blindclock-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// State-store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Blind-schedule errors
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Window-sync errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// State-store errors (open/migrate only; load/save/clear/sweep are
/// infallible by design).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the database file
    #[error("Failed to open state store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Schema migration failed
    #[error("State store migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The data directory could not be created
    #[error("Failed to create data directory: {0}")]
    DataDir(#[from] std::io::Error),
}

/// Blind-schedule validation errors.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// A schedule must contain at least one level
    #[error("Blind schedule is empty")]
    Empty,

    /// Every level must run for at least one minute
    #[error("Level {index} has zero duration")]
    ZeroDuration { index: usize },

    /// Schedule file could not be parsed
    #[error("Failed to parse schedule: {0}")]
    ParseFailed(String),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Window-sync errors.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The broadcast bus rejected a send (all receivers gone)
    #[error("Broadcast bus closed for game '{0}'")]
    BusClosed(String),

    /// The probe URL is not valid
    #[error("Invalid probe URL '{url}': {message}")]
    InvalidProbeUrl { url: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::QueryFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
