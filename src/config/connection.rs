//! WebSocket connection configuration

use serde::Deserialize;
use std::time::Duration;

use super::client::Environment;
use super::error::ValidationError;
use crate::domain::connection::ReusePolicy;

/// WebSocket connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Chat backend endpoint (`ws://` or `wss://`)
    #[serde(default)]
    pub websocket_url: String,

    /// Bound on a single connect attempt, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Minimum spacing between liveness probes, in seconds
    #[serde(default = "default_ping_debounce")]
    pub ping_debounce_secs: u64,

    /// Whether an open connection may serve another conversation
    #[serde(default)]
    pub reuse_policy: ReusePolicy,
}

impl ConnectionConfig {
    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get ping debounce window as Duration
    pub fn ping_debounce(&self) -> Duration {
        Duration::from_secs(self.ping_debounce_secs)
    }

    /// Validate connection configuration
    ///
    /// In production, requires `wss://`.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if self.websocket_url.trim().is_empty() {
            return Err(ValidationError::MissingRequired("CONNECTION__WEBSOCKET_URL"));
        }
        let secure = self.websocket_url.starts_with("wss://");
        if !secure && !self.websocket_url.starts_with("ws://") {
            return Err(ValidationError::InvalidWebSocketUrl);
        }
        if *environment == Environment::Production && !secure {
            return Err(ValidationError::WebSocketMustBeSecure);
        }
        if self.connect_timeout_secs == 0 {
            return Err(ValidationError::ZeroDuration("connect_timeout_secs"));
        }
        if self.ping_debounce_secs == 0 {
            return Err(ValidationError::ZeroDuration("ping_debounce_secs"));
        }
        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            websocket_url: String::new(),
            connect_timeout_secs: default_connect_timeout(),
            ping_debounce_secs: default_ping_debounce(),
            reuse_policy: ReusePolicy::default(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_ping_debounce() -> u64 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_url(url: &str) -> ConnectionConfig {
        ConnectionConfig {
            websocket_url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_connection_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.ping_debounce(), Duration::from_secs(20));
        assert_eq!(config.reuse_policy, ReusePolicy::AnyOpen);
    }

    #[test]
    fn test_validation_missing_url() {
        assert_eq!(
            ConnectionConfig::default().validate(&Environment::Development),
            Err(ValidationError::MissingRequired("CONNECTION__WEBSOCKET_URL"))
        );
    }

    #[test]
    fn test_validation_rejects_http_scheme() {
        assert_eq!(
            with_url("https://chat.example.com").validate(&Environment::Development),
            Err(ValidationError::InvalidWebSocketUrl)
        );
    }

    #[test]
    fn test_validation_production_requires_wss() {
        let config = with_url("ws://localhost:3001");
        // Allowed in development
        assert!(config.validate(&Environment::Development).is_ok());
        // Rejected in production
        assert_eq!(
            config.validate(&Environment::Production),
            Err(ValidationError::WebSocketMustBeSecure)
        );
        assert!(with_url("wss://chat.example.com/prod")
            .validate(&Environment::Production)
            .is_ok());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let config = ConnectionConfig {
            connect_timeout_secs: 0,
            ..with_url("wss://chat.example.com")
        };
        assert_eq!(
            config.validate(&Environment::Development),
            Err(ValidationError::ZeroDuration("connect_timeout_secs"))
        );
    }
}
