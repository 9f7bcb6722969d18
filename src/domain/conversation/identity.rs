//! Conversation identity: the (client, proposal) pair that addresses a chat.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// Characters escaped in query components, matching the browser's
/// `encodeURIComponent` (everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`).
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Immutable (clientName, proposalName) pair.
///
/// Used both as the transport addressing key and as the dedup key for
/// "is this connection already serving this conversation".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationIdentity {
    client_name: String,
    proposal_name: String,
}

impl ConversationIdentity {
    /// Creates an identity.
    ///
    /// # Errors
    ///
    /// - `EmptyField` if either name is blank
    pub fn new(
        client_name: impl Into<String>,
        proposal_name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let client_name = client_name.into();
        let proposal_name = proposal_name.into();

        if client_name.trim().is_empty() {
            return Err(ValidationError::empty_field("clientName"));
        }
        if proposal_name.trim().is_empty() {
            return Err(ValidationError::empty_field("proposalName"));
        }

        Ok(Self {
            client_name,
            proposal_name,
        })
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn proposal_name(&self) -> &str {
        &self.proposal_name
    }

    /// Builds the transport URL for this conversation:
    /// `<base>?clientName=<enc>&proposalName=<enc>`.
    pub fn endpoint_url(&self, base_url: &str) -> String {
        let separator = if base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}clientName={}&proposalName={}",
            base_url,
            separator,
            utf8_percent_encode(&self.client_name, QUERY_COMPONENT),
            utf8_percent_encode(&self.proposal_name, QUERY_COMPONENT),
        )
    }

    /// The `clientProposal` key used by the message history endpoint.
    pub fn client_proposal_key(&self) -> String {
        format!("{}|{}", self.client_name, self.proposal_name)
    }
}

impl fmt::Display for ConversationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.client_name, self.proposal_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_names() {
        assert_eq!(
            ConversationIdentity::new("", "Q3 Renewal"),
            Err(ValidationError::empty_field("clientName"))
        );
        assert_eq!(
            ConversationIdentity::new("Acme", "   "),
            Err(ValidationError::empty_field("proposalName"))
        );
    }

    #[test]
    fn endpoint_url_percent_encodes_both_fields() {
        let identity = ConversationIdentity::new("Acme & Sons", "Q3 Renewal/v2").unwrap();

        assert_eq!(
            identity.endpoint_url("wss://chat.example.com/prod"),
            "wss://chat.example.com/prod?clientName=Acme%20%26%20Sons&proposalName=Q3%20Renewal%2Fv2"
        );
    }

    #[test]
    fn endpoint_url_keeps_unreserved_marks() {
        let identity = ConversationIdentity::new("O'Brien (UK)", "draft-1.final~*!").unwrap();

        assert_eq!(
            identity.endpoint_url("ws://localhost:9000"),
            "ws://localhost:9000?clientName=O'Brien%20(UK)&proposalName=draft-1.final~*!"
        );
    }

    #[test]
    fn endpoint_url_appends_to_existing_query() {
        let identity = ConversationIdentity::new("Acme", "Pilot").unwrap();

        assert_eq!(
            identity.endpoint_url("ws://localhost:9000/ws?stage=dev"),
            "ws://localhost:9000/ws?stage=dev&clientName=Acme&proposalName=Pilot"
        );
    }

    #[test]
    fn client_proposal_key_joins_with_pipe() {
        let identity = ConversationIdentity::new("Acme", "Pilot").unwrap();
        assert_eq!(identity.client_proposal_key(), "Acme|Pilot");
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let identity = ConversationIdentity::new("Acme", "Pilot").unwrap();
        let json = serde_json::to_string(&identity).unwrap();

        assert_eq!(json, r#"{"clientName":"Acme","proposalName":"Pilot"}"#);
    }
}
