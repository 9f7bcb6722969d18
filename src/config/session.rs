//! Session timing configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Session timing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Keep-alive loop period, in seconds
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_secs: u64,

    /// Pause before the initialization send, in milliseconds
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Text sent once for every newly created conversation
    #[serde(default = "default_initialization_message")]
    pub initialization_message: String,
}

impl SessionConfig {
    /// Get keep-alive interval as Duration
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    /// Get settle delay as Duration
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Validate session configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.keep_alive_interval_secs == 0 {
            return Err(ValidationError::ZeroDuration("keep_alive_interval_secs"));
        }
        if self.initialization_message.trim().is_empty() {
            return Err(ValidationError::EmptyInitializationMessage);
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval_secs: default_keep_alive_interval(),
            settle_delay_ms: default_settle_delay(),
            initialization_message: default_initialization_message(),
        }
    }
}

fn default_keep_alive_interval() -> u64 {
    45
}

fn default_settle_delay() -> u64 {
    500
}

fn default_initialization_message() -> String {
    "Create Proposal".to_string()
}
