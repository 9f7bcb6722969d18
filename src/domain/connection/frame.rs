//! Wire frames exchanged with the chat backend.
//!
//! - Client → Server: [`OutboundEnvelope`], one per user message
//! - Server → Client: [`InboundPayload`], decoded at the boundary into an
//!   [`InboundFrame`] and never propagated deeper as untyped JSON

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ConnectionError;
use crate::domain::conversation::ConversationIdentity;

/// `!!!<text>!!!` spanning the whole payload. Non-greedy and dot-matches-newline
/// so multi-line status text captures correctly.
static ADVISOR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^!!!(.*?)!!!$").expect("advisor pattern is a valid regex"));

// ============================================
// Client → Server
// ============================================

/// The only action the chat backend accepts from clients.
pub const MESSAGE_ACTION: &str = "message";

/// Outbound chat frame.
///
/// `created_by` is resolved from the token source at send time and never
/// cached across sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEnvelope {
    pub action: &'static str,
    pub client_name: String,
    pub proposal_name: String,
    pub body: String,
    pub created_by: String,
}

impl OutboundEnvelope {
    /// Builds a `message` envelope addressed to a conversation.
    pub fn message(
        identity: &ConversationIdentity,
        body: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            action: MESSAGE_ACTION,
            client_name: identity.client_name().to_string(),
            proposal_name: identity.proposal_name().to_string(),
            body: body.into(),
            created_by: created_by.into(),
        }
    }

    /// Serializes to the JSON text written on the socket.
    pub fn to_json(&self) -> Result<String, ConnectionError> {
        serde_json::to_string(self).map_err(|e| ConnectionError::Encode(e.to_string()))
    }
}

// ============================================
// Server → Client
// ============================================

/// Raw inbound payload as sent by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundPayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub connection_id: Option<String>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Transient progress indicator (`!!!text!!!`).
    AdvisorStatus { text: String },
    /// Ordinary chat content from the AI.
    ChatContent { text: String },
    /// Well-formed payload with no `message` (e.g. a bare correlation id).
    Unrecognized,
}

impl InboundFrame {
    /// Classifies a textual message payload.
    pub fn classify(text: &str) -> Self {
        match ADVISOR_PATTERN.captures(text) {
            Some(captures) => InboundFrame::AdvisorStatus {
                text: captures
                    .get(1)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            },
            None => InboundFrame::ChatContent {
                text: text.to_string(),
            },
        }
    }

    /// Returns true for advisor status frames.
    pub fn is_advisor_status(&self) -> bool {
        matches!(self, InboundFrame::AdvisorStatus { .. })
    }
}

/// Result of decoding one raw transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub frame: InboundFrame,
    pub connection_id: Option<String>,
}

impl DecodedFrame {
    /// Decodes and classifies a raw text payload.
    ///
    /// # Errors
    ///
    /// - `MalformedInboundFrame` if the text is not a JSON object of the
    ///   expected shape
    pub fn decode(raw: &str) -> Result<Self, ConnectionError> {
        let payload: InboundPayload = serde_json::from_str(raw)
            .map_err(|e| ConnectionError::MalformedInboundFrame(e.to_string()))?;

        let frame = match payload.message.as_deref() {
            Some(text) => InboundFrame::classify(text),
            None => InboundFrame::Unrecognized,
        };

        Ok(Self {
            frame,
            connection_id: payload.connection_id,
        })
    }
}
