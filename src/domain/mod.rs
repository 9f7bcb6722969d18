//! Domain layer containing the chat client's domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (timestamps, auth identity, errors)
//! - `conversation` - Conversation identity, message log, pristine status
//! - `connection` - Connection lifecycle, wire frames, failure taxonomy

pub mod connection;
pub mod conversation;
pub mod foundation;
