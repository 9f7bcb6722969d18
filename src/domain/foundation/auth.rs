//! Authentication types for the domain layer.
//!
//! The chat core never talks to the identity provider directly. It asks the
//! `TokenSource` port for the caller's current [`BearerIdentity`] at the
//! moment it needs one and treats every failure as an [`AuthError`].
//!
//! # Design Decisions
//!
//! - `BearerIdentity` carries only what the core uses: the raw token (for the
//!   REST directory) and the email claim (for `createdBy` on outbound frames)
//! - The token is wrapped in `secrecy::SecretString` so it never shows up in
//!   `Debug` output or logs
//! - `AuthError` is provider-agnostic

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Sender identity used when the token carries no email claim.
pub const ANONYMOUS_EMAIL: &str = "anonymous@user.com";

/// The caller's current auth identity, resolved on demand.
#[derive(Debug, Clone)]
pub struct BearerIdentity {
    token: SecretString,
    email: String,
}

impl BearerIdentity {
    /// Creates a bearer identity from a raw token and its email claim.
    pub fn new(token: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            email: email.into(),
        }
    }

    /// Creates a bearer identity, falling back to [`ANONYMOUS_EMAIL`] when
    /// the email claim is absent or blank.
    pub fn with_optional_email(token: impl Into<String>, email: Option<String>) -> Self {
        let email = email
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| ANONYMOUS_EMAIL.to_string());
        Self::new(token, email)
    }

    /// The principal's email address (the `createdBy` of outbound frames).
    pub fn email(&self) -> &str {
        &self.email
    }

    /// The raw bearer token.
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

/// Authentication errors surfaced by a `TokenSource`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No signed-in session exists.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The token is malformed or its claims cannot be read.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The identity provider is unreachable.
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    /// Creates a service unavailable error with a message.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Returns true if this error indicates the user should re-authenticate.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            AuthError::NotAuthenticated | AuthError::InvalidToken | AuthError::TokenExpired
        )
    }

    /// Returns true if this is a transient error that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }
}
