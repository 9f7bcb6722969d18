//! Proposal directory configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Proposal directory (REST API) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL of the REST API; the directory is disabled when unset
    pub api_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl DirectoryConfig {
    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check if the directory is configured
    pub fn is_enabled(&self) -> bool {
        self.api_url.is_some()
    }

    /// Validate directory configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(url) = &self.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ValidationError::InvalidDirectoryUrl);
            }
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 300 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_disabled_by_default() {
        let config = DirectoryConfig::default();
        assert!(!config.is_enabled());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let config = DirectoryConfig {
            api_url: Some("ftp://api.example.com".to_string()),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidDirectoryUrl));
    }

    #[test]
    fn test_validation_timeout_range() {
        for secs in [0, 301] {
            let config = DirectoryConfig {
                request_timeout_secs: secs,
                ..Default::default()
            };
            assert_eq!(config.validate(), Err(ValidationError::InvalidTimeout));
        }
    }
}
