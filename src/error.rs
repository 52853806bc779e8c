//! Custom error types for the headcount monitor.
//!
//! This module defines domain-specific error types using thiserror,
//! providing clear error messages and proper error context propagation.

use thiserror::Error;

/// Errors raised while talking to a sensor's telemetry or video endpoint.
///
/// These never reach the session layer: the telemetry client folds them into
/// "absent" results and only logs them.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("HTTP client could not be built: {0}")]
    ClientBuild(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("endpoint answered with status {0}")]
    Status(u16),

    #[error("malformed telemetry body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid telemetry value for {field}: {value}")]
    InvalidValue { field: &'static str, value: f64 },

    #[error("stream closed before the first frame")]
    EmptyStream,
}

/// Errors related to the durable key-value store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode stored value: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to replace storage file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Errors surfaced by the stream registry to the operator
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cannot delete stream {0}: only custom streams can be deleted")]
    CannotDelete(String),

    #[error("Stream not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors related to the login gate
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Not logged in (run `headcount-monitor login`)")]
    NotLoggedIn,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors related to application configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors related to the UI
#[derive(Debug, Error)]
pub enum UiError {
    #[error("Terminal initialization failed: {0}")]
    InitializationError(String),

    #[error("Terminal rendering failed: {0}")]
    RenderError(String),

    #[error("Input handling failed: {0}")]
    InputError(String),
}

/// Errors related to service/daemon operations
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Service initialization failed: {0}")]
    InitializationError(String),

    #[error("Signal handling error: {0}")]
    SignalError(String),

    #[error("Unknown stream: {0}")]
    UnknownStream(String),
}

/// Application-level errors that can wrap other error types
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("UI error: {0}")]
    Ui(#[from] UiError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Convenience type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;
