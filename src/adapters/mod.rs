//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the chat core to external systems:
//! - `auth` - Token sources (ID token, mock)
//! - `websocket` - Transport connectors (tokio-tungstenite, in-memory)
//! - `directory` - Proposal directory over the REST API

pub mod auth;
pub mod directory;
pub mod websocket;

pub use auth::{IdTokenSource, MockTokenSource};
pub use directory::{HttpDirectoryConfig, HttpProposalDirectory};
pub use websocket::{ConnectBehavior, InMemoryConnector, PeerHandle, TungsteniteConnector};
