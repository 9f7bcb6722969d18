//! Connection domain module.
//!
//! Vocabulary of the real-time link to the chat backend: the connection
//! lifecycle state, the wire frames in both directions, and the failure
//! taxonomy shared by the connection manager and session coordinator.

mod error;
mod frame;
mod policy;
mod state;

pub use error::ConnectionError;
pub use frame::{DecodedFrame, InboundFrame, InboundPayload, OutboundEnvelope, MESSAGE_ACTION};
pub use policy::ReusePolicy;
pub use state::ConnectionState;
