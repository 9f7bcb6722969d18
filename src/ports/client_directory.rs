//! Client directory port - the sales team's client list.

use async_trait::async_trait;
use serde::Deserialize;

use super::DirectoryError;
use crate::domain::foundation::Timestamp;

/// A client known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

/// Lists and registers clients.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// List every client visible to the signed-in user.
    async fn list_clients(&self) -> Result<Vec<ClientSummary>, DirectoryError>;

    /// Register a new client and return it as stored.
    async fn add_client(
        &self,
        name: &str,
        description: &str,
    ) -> Result<ClientSummary, DirectoryError>;
}
