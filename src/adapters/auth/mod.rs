//! Authentication adapters.
//!
//! Implementations of the `TokenSource` port:
//!
//! - `id_token` - Reads the sender identity from the signed-in OIDC ID token
//! - `mock` - Test implementation that doesn't require an identity provider

mod id_token;
mod mock;

pub use id_token::IdTokenSource;
pub use mock::MockTokenSource;
