//! ProposalDirectory port - REST listing of proposals and their history.
//!
//! Plain request/response lookups used to populate the conversation
//! catalogue. The real-time chat itself never goes through this port.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::conversation::ConversationIdentity;
use crate::domain::foundation::{AuthError, Timestamp};

/// A proposal known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSummary {
    pub client_name: String,
    pub proposal_name: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// One stored message of a proposal's history.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub message: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Errors from directory lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("Directory request not authorized: {0}")]
    Auth(#[from] AuthError),

    #[error("Directory request failed: {0}")]
    Http(String),

    #[error("Directory returned HTTP {0}")]
    Status(u16),

    #[error("Directory returned an unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Directory API is not configured")]
    NotConfigured,
}

/// Lists proposals and fetches their stored messages.
#[async_trait]
pub trait ProposalDirectory: Send + Sync {
    /// List proposals, optionally only those of one client.
    async fn list_proposals(
        &self,
        client_name: Option<&str>,
    ) -> Result<Vec<ProposalSummary>, DirectoryError>;

    /// Fetch the stored message history of one proposal, oldest first.
    async fn fetch_messages(
        &self,
        identity: &ConversationIdentity,
    ) -> Result<Vec<StoredMessage>, DirectoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_summary_deserializes_wire_shape() {
        let json = r#"{
            "clientName": "Acme",
            "proposalName": "Q3 Renewal",
            "createdAt": "2024-05-01T12:00:00Z",
            "createdBy": "rep@example.com",
            "message": "Create Proposal",
            "name": "Acme|Q3 Renewal",
            "type": "proposal"
        }"#;

        let summary: ProposalSummary = serde_json::from_str(json).unwrap();
        assert_eq!(summary.client_name, "Acme");
        assert_eq!(summary.proposal_name, "Q3 Renewal");
        assert_eq!(summary.created_by.as_deref(), Some("rep@example.com"));
    }

    #[test]
    fn stored_message_reads_type_field() {
        let json = r#"{"message":"hi","createdAt":"2024-05-01T12:00:00Z","type":"ai"}"#;
        let stored: StoredMessage = serde_json::from_str(json).unwrap();
        assert_eq!(stored.kind.as_deref(), Some("ai"));
    }

    #[test]
    fn proposal_directory_trait_is_object_safe_and_send_sync() {
        fn _assert_trait_object(_: &dyn ProposalDirectory) {}
        fn _assert_arc_send_sync<T: Send + Sync + ?Sized>() {}
        _assert_arc_send_sync::<std::sync::Arc<dyn ProposalDirectory>>();
    }
}
