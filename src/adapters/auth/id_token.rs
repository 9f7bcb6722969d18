//! ID token adapter for the `TokenSource` port.
//!
//! Holds the OIDC ID token handed over by the sign-in flow and reads the
//! sender identity out of its claims on every lookup.
//!
//! # Security
//!
//! The signature is **not** verified here. The token was issued to this
//! client by the identity provider and is only used to label outbound
//! frames and authorize REST calls; the backend verifies it. Expiry is still
//! checked so a stale session surfaces as `TokenExpired` instead of being
//! sent on.

use std::collections::HashSet;

use async_trait::async_trait;
use jsonwebtoken::{decode, errors::ErrorKind, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::domain::foundation::{AuthError, BearerIdentity};
use crate::ports::TokenSource;

/// Claims read from the ID token.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    email: Option<String>,
}

/// Token source backed by an OIDC ID token.
pub struct IdTokenSource {
    token: RwLock<Option<SecretString>>,
}

impl IdTokenSource {
    /// Creates a signed-out source.
    pub fn new() -> Self {
        Self {
            token: RwLock::new(None),
        }
    }

    /// Creates a source signed in with `token`.
    pub fn with_token(token: SecretString) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }

    /// Replaces the current token (sign-in or refresh).
    pub async fn set_token(&self, token: SecretString) {
        *self.token.write().await = Some(token);
    }

    /// Forgets the current token (sign-out).
    pub async fn clear(&self) {
        *self.token.write().await = None;
    }

    fn read_claims(token: &str) -> Result<IdTokenClaims, AuthError> {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        decode::<IdTokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => {
                    tracing::debug!("ID token expired");
                    AuthError::TokenExpired
                }
                _ => {
                    tracing::warn!("ID token could not be read: {}", e);
                    AuthError::InvalidToken
                }
            })
    }
}

impl Default for IdTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenSource for IdTokenSource {
    async fn current_identity(&self) -> Result<BearerIdentity, AuthError> {
        let guard = self.token.read().await;
        let token = guard.as_ref().ok_or(AuthError::NotAuthenticated)?;
        let raw = token.expose_secret();

        let claims = Self::read_claims(raw)?;
        if claims.email.is_none() {
            tracing::debug!("ID token has no email claim, sending as anonymous");
        }

        Ok(BearerIdentity::with_optional_email(raw.clone(), claims.email))
    }
}

impl std::fmt::Debug for IdTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdTokenSource").finish_non_exhaustive()
    }
}
