//! Connection error taxonomy.
//!
//! Every failure in the connection core degrades to one of these values;
//! none of them terminate the process.

use thiserror::Error;

use crate::domain::foundation::AuthError;

/// Failures of the connection and session core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The transport did not open within the connect timeout.
    #[error("Connection attempt timed out")]
    ConnectTimeout,

    /// The transport reported an error during the handshake.
    #[error("Connection rejected: {0}")]
    ConnectRejected(String),

    /// A send was attempted with no open connection.
    #[error("No open connection")]
    SendWhileDisconnected,

    /// The token source could not produce a bearer identity.
    #[error("Auth unavailable: {0}")]
    AuthUnavailable(#[from] AuthError),

    /// The transport refused the write.
    #[error("Transport rejected the write")]
    WriteRejected,

    /// An inbound payload could not be decoded.
    #[error("Malformed inbound frame: {0}")]
    MalformedInboundFrame(String),

    /// The reconnect-and-retry cycle also failed.
    #[error("Message could not be delivered after retry")]
    DoubleSendFailure,

    /// An outbound envelope could not be encoded.
    #[error("Failed to encode outbound frame: {0}")]
    Encode(String),
}

impl ConnectionError {
    /// Returns true if a later `connect` can recover from this failure.
    pub fn is_recoverable_by_reconnect(&self) -> bool {
        matches!(
            self,
            ConnectionError::ConnectTimeout
                | ConnectionError::ConnectRejected(_)
                | ConnectionError::SendWhileDisconnected
                | ConnectionError::WriteRejected
        )
    }

    /// Returns true if the user has to sign in again before sends can work.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, ConnectionError::AuthUnavailable(e) if e.requires_reauthentication())
    }
}
