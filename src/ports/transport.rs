//! Transport port - opening a duplex text connection to the chat backend.
//!
//! The connection manager is the only component that holds a
//! [`TransportLink`]. Adapters map their socket library onto two halves:
//!
//! - a sink of [`OutboundFrame`]s
//! - a stream of inbound text payloads, which ends when the peer closes and
//!   yields an `Err` when the transport fails

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};
use thiserror::Error;

/// A frame written to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A JSON text payload.
    Text(String),
    /// A protocol-level liveness probe.
    Ping,
}

/// Errors raised by transport adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The handshake failed (DNS, TCP, TLS, HTTP upgrade).
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The connection is closed.
    #[error("Connection closed")]
    Closed,

    /// Any other I/O or protocol failure.
    #[error("Transport error: {0}")]
    Io(String),
}

/// Write half of an open connection.
pub type FrameSink = Pin<Box<dyn Sink<OutboundFrame, Error = TransportError> + Send>>;

/// Read half of an open connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An open duplex connection.
pub struct TransportLink {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl TransportLink {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for TransportLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportLink").finish_non_exhaustive()
    }
}

/// Opens transport connections.
///
/// # Contract
///
/// - `open` resolves only once the connection is fully open, or fails
/// - Implementations impose no timeout of their own; the caller bounds it
/// - Dropping the returned future abandons the attempt
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`.
    async fn open(&self, url: &str) -> Result<TransportLink, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_displays_correctly() {
        assert_eq!(
            TransportError::Handshake("HTTP 403".into()).to_string(),
            "Handshake failed: HTTP 403"
        );
        assert_eq!(TransportError::Closed.to_string(), "Connection closed");
    }

    #[test]
    fn connector_trait_is_object_safe_and_send_sync() {
        fn _assert_trait_object(_: &dyn Connector) {}
        fn _assert_arc_send_sync<T: Send + Sync + ?Sized>() {}
        _assert_arc_send_sync::<std::sync::Arc<dyn Connector>>();
    }
}
