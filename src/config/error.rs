//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("WebSocket URL must start with ws:// or wss://")]
    InvalidWebSocketUrl,

    #[error("WebSocket URL must use wss:// in production")]
    WebSocketMustBeSecure,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Directory API URL must start with http:// or https://")]
    InvalidDirectoryUrl,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Initialization message cannot be empty")]
    EmptyInitializationMessage,
}
