//! WebSocket transport adapters.
//!
//! Implementations of the `Connector` port:
//!
//! - [`tungstenite`] - Real `ws://`/`wss://` connections
//! - [`memory`] - Scriptable in-process transport for tests

pub mod memory;
pub mod tungstenite;

pub use memory::{ConnectBehavior, InMemoryConnector, PeerHandle};
pub use tungstenite::TungsteniteConnector;
