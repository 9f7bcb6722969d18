//! TokenSource port - the caller's current auth identity, on demand.
//!
//! The identity provider itself (sign-in, refresh, hosted UI) lives outside
//! this crate. The chat core only ever asks "who is signed in right now?"
//! and must cope with the answer being "nobody".

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, BearerIdentity};

/// Supplies the current bearer identity.
///
/// # Contract
///
/// Implementations must:
/// - Resolve the identity fresh on every call; callers never cache it
/// - Return `AuthError::NotAuthenticated` when no session exists
/// - Return `AuthError::ServiceUnavailable` for transient errors
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Get the current bearer token and principal email.
    async fn current_identity(&self) -> Result<BearerIdentity, AuthError>;
}
