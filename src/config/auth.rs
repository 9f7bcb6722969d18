//! Authentication configuration

use secrecy::SecretString;
use serde::Deserialize;

/// Authentication configuration
///
/// The ID token is normally handed over by the sign-in flow at runtime; it
/// can be preset here for scripted use.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// OIDC ID token whose `email` claim identifies the sender
    #[serde(default)]
    pub id_token: Option<SecretString>,
}

impl AuthConfig {
    /// Check whether a token was preset
    pub fn has_token(&self) -> bool {
        self.id_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_config_defaults() {
        assert!(!AuthConfig::default().has_token());
    }

    #[test]
    fn test_debug_hides_token() {
        let config = AuthConfig {
            id_token: Some(SecretString::new("eyJhbGciOi.secret".to_string())),
        };
        assert!(config.has_token());
        assert!(!format!("{:?}", config).contains("eyJhbGciOi"));
    }
}
