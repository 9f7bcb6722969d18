//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the chat core and the outside world. Adapters implement these ports.
//!
//! - `TokenSource` - Current bearer identity from the identity provider
//! - `Connector` - Opens the duplex transport to the chat backend
//! - `ProposalDirectory` - REST listing of proposals and message history
//! - `ClientDirectory` - REST listing and registration of clients

mod client_directory;
mod proposal_directory;
mod token_source;
mod transport;

pub use client_directory::{ClientDirectory, ClientSummary};
pub use proposal_directory::{DirectoryError, ProposalDirectory, ProposalSummary, StoredMessage};
pub use token_source::TokenSource;
pub use transport::{
    Connector, FrameSink, FrameStream, OutboundFrame, TransportError, TransportLink,
};
