//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, the state machine trait, and error types that
//! form the vocabulary of the proposal chat domain.

mod auth;
mod errors;
mod state_machine;
mod timestamp;

pub use auth::{AuthError, BearerIdentity, ANONYMOUS_EMAIL};
pub use errors::ValidationError;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
