//! Mock token source for testing.
//!
//! Implements the `TokenSource` port without an identity provider, with
//! knobs for the failure paths the chat core has to survive.
//!
//! # Example
//!
//! ```ignore
//! use proposal_chat::adapters::auth::MockTokenSource;
//! use proposal_chat::domain::foundation::AuthError;
//!
//! let tokens = MockTokenSource::signed_in("rep@example.com");
//!
//! // Next two lookups fail, then it recovers
//! tokens.fail_next(2, AuthError::service_unavailable("blip"));
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, BearerIdentity};
use crate::ports::TokenSource;

/// Mock token source for testing.
///
/// Signed out by default: lookups return `NotAuthenticated`.
#[derive(Debug, Default)]
pub struct MockTokenSource {
    /// Identity returned while signed in
    identity: RwLock<Option<BearerIdentity>>,
    /// Optional error to return for all lookups
    force_error: RwLock<Option<AuthError>>,
    /// Remaining lookups that fail with `transient_error`
    failures_remaining: AtomicUsize,
    transient_error: RwLock<Option<AuthError>>,
    /// Total number of lookups
    requests: AtomicUsize,
}

impl MockTokenSource {
    /// Creates a signed-out token source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token source signed in as `email`.
    pub fn signed_in(email: impl Into<String>) -> Self {
        Self::new().with_identity(BearerIdentity::new("mock-id-token", email))
    }

    /// Sets the identity returned by lookups.
    pub fn with_identity(self, identity: BearerIdentity) -> Self {
        *self.identity.write().unwrap() = Some(identity);
        self
    }

    /// Forces all lookups to return the specified error.
    pub fn with_error(self, error: AuthError) -> Self {
        *self.force_error.write().unwrap() = Some(error);
        self
    }

    /// Clears the forced error and returns to normal operation.
    pub fn clear_error(&self) {
        *self.force_error.write().unwrap() = None;
    }

    /// Makes the next `count` lookups fail with `error`.
    pub fn fail_next(&self, count: usize, error: AuthError) {
        *self.transient_error.write().unwrap() = Some(error);
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Signs in at runtime.
    pub fn sign_in(&self, identity: BearerIdentity) {
        *self.identity.write().unwrap() = Some(identity);
    }

    /// Signs out at runtime.
    pub fn sign_out(&self) {
        *self.identity.write().unwrap() = None;
    }

    /// Returns how many lookups have been made.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for MockTokenSource {
    async fn current_identity(&self) -> Result<BearerIdentity, AuthError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.force_error.read().unwrap().clone() {
            return Err(error);
        }

        let consumed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            if let Some(error) = self.transient_error.read().unwrap().clone() {
                return Err(error);
            }
        }

        self.identity
            .read()
            .unwrap()
            .clone()
            .ok_or(AuthError::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signed_in_source_returns_identity() {
        let tokens = MockTokenSource::signed_in("rep@example.com");

        let identity = tokens.current_identity().await.unwrap();

        assert_eq!(identity.email(), "rep@example.com");
    }

    #[tokio::test]
    async fn new_source_is_signed_out() {
        let tokens = MockTokenSource::new();

        let result = tokens.current_identity().await;

        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn with_error_forces_error() {
        let tokens = MockTokenSource::signed_in("rep@example.com")
            .with_error(AuthError::service_unavailable("down"));

        assert!(matches!(
            tokens.current_identity().await,
            Err(AuthError::ServiceUnavailable(_))
        ));

        tokens.clear_error();
        assert!(tokens.current_identity().await.is_ok());
    }

    #[tokio::test]
    async fn fail_next_fails_exactly_that_many_lookups() {
        let tokens = MockTokenSource::signed_in("rep@example.com");
        tokens.fail_next(2, AuthError::TokenExpired);

        assert_eq!(tokens.current_identity().await.unwrap_err(), AuthError::TokenExpired);
        assert_eq!(tokens.current_identity().await.unwrap_err(), AuthError::TokenExpired);
        assert!(tokens.current_identity().await.is_ok());
        assert_eq!(tokens.request_count(), 3);
    }

    #[tokio::test]
    async fn sign_out_at_runtime() {
        let tokens = MockTokenSource::signed_in("rep@example.com");
        tokens.sign_out();

        assert!(matches!(
            tokens.current_identity().await,
            Err(AuthError::NotAuthenticated)
        ));
    }
}
