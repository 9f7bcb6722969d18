//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `PROPOSAL_CHAT_` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use proposal_chat::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Chat endpoint: {}", config.connection.websocket_url);
//! ```

mod auth;
mod client;
mod connection;
mod directory;
mod error;
mod session;

pub use auth::AuthConfig;
pub use client::{ClientConfig, Environment};
pub use connection::ConnectionConfig;
pub use directory::DirectoryConfig;
pub use error::{ConfigError, ValidationError};
pub use session::SessionConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Client runtime configuration (environment, log filter)
    #[serde(default)]
    pub client: ClientConfig,

    /// WebSocket connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Session timing configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Proposal directory configuration
    #[serde(default)]
    pub directory: DirectoryConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `PROPOSAL_CHAT` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `PROPOSAL_CHAT__CONNECTION__WEBSOCKET_URL=wss://...` -> `connection.websocket_url`
    /// - `PROPOSAL_CHAT__SESSION__KEEP_ALIVE_INTERVAL_SECS=45` -> `session.keep_alive_interval_secs`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("PROPOSAL_CHAT")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.client.validate()?;
        self.connection.validate(&self.client.environment)?;
        self.session.validate()?;
        self.directory.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.client.is_production()
    }
}
