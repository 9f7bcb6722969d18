//! HTTP adapter for the `ProposalDirectory` and `ClientDirectory` ports.
//!
//! Talks to the proposal REST API:
//!
//! - `GET {api_url}/proposal?type=proposal[&clientName=..]` returns a JSON
//!   array of proposals (anything else is treated as an empty listing)
//! - `GET {api_url}/message?clientProposal=<client>|<proposal>` returns
//!   `{ "success": bool, "messages": [...] }`
//! - `GET {api_url}/client` returns `{ "clients": [...] }`
//! - `PUT {api_url}/client` with `{ name, description }` returns
//!   `{ "message": .., "client": {..} }`
//!
//! Every request carries the caller's raw ID token in the `Authorization`
//! header, resolved from the `TokenSource` at call time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::json;

use crate::domain::conversation::ConversationIdentity;
use crate::domain::foundation::Timestamp;
use crate::ports::{
    ClientDirectory, ClientSummary, DirectoryError, ProposalDirectory, ProposalSummary,
    StoredMessage, TokenSource,
};

/// Response body of the message history endpoint.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    messages: Vec<StoredMessage>,
}

/// Response body of the client listing endpoint.
#[derive(Debug, Deserialize)]
struct ClientsResponse {
    clients: Vec<ClientSummary>,
}

/// Response body of the client registration endpoint.
#[derive(Debug, Deserialize)]
struct AddClientResponse {
    client: ClientSummary,
}

/// Configuration for the HTTP directory.
#[derive(Debug, Clone)]
pub struct HttpDirectoryConfig {
    /// Base URL of the REST API, without trailing slash.
    pub api_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpDirectoryConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Proposal directory backed by the REST API.
pub struct HttpProposalDirectory {
    config: HttpDirectoryConfig,
    client: Client,
    tokens: Arc<dyn TokenSource>,
}

impl HttpProposalDirectory {
    /// Creates a directory client.
    pub fn new(
        config: HttpDirectoryConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DirectoryError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            tokens,
        })
    }

    fn proposals_url(&self, client_name: Option<&str>) -> Result<Url, DirectoryError> {
        let mut url = self.endpoint("proposal")?;
        url.query_pairs_mut().append_pair("type", "proposal");
        if let Some(client) = client_name.filter(|c| !c.is_empty()) {
            url.query_pairs_mut().append_pair("clientName", client);
        }
        Ok(url)
    }

    fn messages_url(&self, identity: &ConversationIdentity) -> Result<Url, DirectoryError> {
        let mut url = self.endpoint("message")?;
        url.query_pairs_mut()
            .append_pair("clientProposal", &identity.client_proposal_key());
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, DirectoryError> {
        Url::parse(&format!("{}/{}", self.config.api_url, path))
            .map_err(|e| DirectoryError::Http(format!("Invalid directory URL: {}", e)))
    }

    fn clients_url(&self) -> Result<Url, DirectoryError> {
        self.endpoint("client")
    }

    async fn get_json(&self, url: Url) -> Result<serde_json::Value, DirectoryError> {
        tracing::debug!(path = url.path(), "Directory request");
        self.send_json(self.client.get(url)).await
    }

    async fn put_json(
        &self,
        url: Url,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, DirectoryError> {
        tracing::debug!(path = url.path(), "Directory update");
        self.send_json(self.client.put(url).body(body.to_string())).await
    }

    async fn send_json(
        &self,
        request: RequestBuilder,
    ) -> Result<serde_json::Value, DirectoryError> {
        let identity = self.tokens.current_identity().await?;

        let response = request
            .header("Authorization", identity.token())
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DirectoryError::Http(format!(
                        "Request timed out after {}s",
                        self.config.timeout.as_secs()
                    ))
                } else if e.is_connect() {
                    DirectoryError::Http(format!("Connection failed: {}", e))
                } else {
                    DirectoryError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Directory request rejected");
            return Err(DirectoryError::Status(status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| DirectoryError::Http(format!("Invalid response body: {}", e)))
    }
}

/// Reads a client listing.
fn parse_clients(body: serde_json::Value) -> Result<Vec<ClientSummary>, DirectoryError> {
    let response: ClientsResponse = serde_json::from_value(body).map_err(|e| {
        tracing::warn!(error = %e, "Client listing has an unexpected format");
        DirectoryError::UnexpectedResponse(format!("client listing: {}", e))
    })?;
    Ok(response.clients)
}

/// Reads the stored client from a registration response. The request's
/// description stands in when the response omits it.
fn parse_added_client(
    body: serde_json::Value,
    description: &str,
) -> Result<ClientSummary, DirectoryError> {
    let response: AddClientResponse = serde_json::from_value(body).map_err(|e| {
        DirectoryError::UnexpectedResponse(format!("client registration: {}", e))
    })?;
    let mut client = response.client;
    if client.description.is_empty() {
        client.description = description.to_string();
    }
    client.created_at.get_or_insert_with(Timestamp::now);
    Ok(client)
}

/// Reads a proposal listing; a body that is not an array is an empty listing.
fn parse_proposals(body: serde_json::Value) -> Result<Vec<ProposalSummary>, DirectoryError> {
    if !body.is_array() {
        tracing::warn!("Proposal listing is not an array, treating as empty");
        return Ok(Vec::new());
    }
    serde_json::from_value(body)
        .map_err(|e| DirectoryError::Http(format!("Invalid proposal listing: {}", e)))
}

/// Reads a message history; an unsuccessful response is an empty history.
fn parse_messages(body: serde_json::Value) -> Result<Vec<StoredMessage>, DirectoryError> {
    let response: MessagesResponse = serde_json::from_value(body)
        .map_err(|e| DirectoryError::Http(format!("Invalid message history: {}", e)))?;
    Ok(if response.success {
        response.messages
    } else {
        Vec::new()
    })
}

#[async_trait]
impl ProposalDirectory for HttpProposalDirectory {
    async fn list_proposals(
        &self,
        client_name: Option<&str>,
    ) -> Result<Vec<ProposalSummary>, DirectoryError> {
        let body = self.get_json(self.proposals_url(client_name)?).await?;
        parse_proposals(body)
    }

    async fn fetch_messages(
        &self,
        identity: &ConversationIdentity,
    ) -> Result<Vec<StoredMessage>, DirectoryError> {
        let body = self.get_json(self.messages_url(identity)?).await?;
        parse_messages(body)
    }
}

#[async_trait]
impl ClientDirectory for HttpProposalDirectory {
    async fn list_clients(&self) -> Result<Vec<ClientSummary>, DirectoryError> {
        let body = self.get_json(self.clients_url()?).await?;
        parse_clients(body)
    }

    async fn add_client(
        &self,
        name: &str,
        description: &str,
    ) -> Result<ClientSummary, DirectoryError> {
        let body = json!({ "name": name, "description": description });
        let response = self.put_json(self.clients_url()?, body).await?;
        let client = parse_added_client(response, description)?;
        tracing::info!(client_name = %client.name, "Registered client");
        Ok(client)
    }
}

impl std::fmt::Debug for HttpProposalDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProposalDirectory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::MockTokenSource;
    use serde_json::json;

    fn directory() -> HttpProposalDirectory {
        HttpProposalDirectory::new(
            HttpDirectoryConfig::new("https://api.example.com/prod/"),
            Arc::new(MockTokenSource::signed_in("rep@example.com")),
        )
        .unwrap()
    }

    #[test]
    fn config_trims_trailing_slash() {
        let config = HttpDirectoryConfig::new("https://api.example.com/prod/");
        assert_eq!(config.api_url, "https://api.example.com/prod");
    }

    #[test]
    fn proposals_url_filters_by_type() {
        let url = directory().proposals_url(None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/prod/proposal?type=proposal"
        );
    }

    #[test]
    fn proposals_url_adds_client_filter() {
        let url = directory().proposals_url(Some("Acme & Co")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/prod/proposal?type=proposal&clientName=Acme+%26+Co"
        );
    }

    #[test]
    fn messages_url_uses_client_proposal_key() {
        let identity = ConversationIdentity::new("Acme", "Q3").unwrap();
        let url = directory().messages_url(&identity).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/prod/message?clientProposal=Acme%7CQ3"
        );
    }

    #[test]
    fn non_array_listing_is_empty() {
        let proposals = parse_proposals(json!({ "error": "nope" })).unwrap();
        assert!(proposals.is_empty());
    }

    #[test]
    fn array_listing_is_parsed() {
        let proposals = parse_proposals(json!([{
            "clientName": "Acme",
            "proposalName": "Q3",
            "createdAt": "2024-05-01T12:00:00Z"
        }]))
        .unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].proposal_name, "Q3");
    }

    #[test]
    fn unsuccessful_history_is_empty() {
        let messages = parse_messages(json!({
            "success": false,
            "messages": [{ "message": "hi", "createdAt": "2024-05-01T12:00:00Z" }]
        }))
        .unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn successful_history_is_returned_in_order() {
        let messages = parse_messages(json!({
            "success": true,
            "messages": [
                { "message": "first", "createdAt": "2024-05-01T12:00:00Z" },
                { "message": "second", "createdAt": "2024-05-01T12:01:00Z" }
            ]
        }))
        .unwrap();
        let bodies: Vec<_> = messages.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
    }

    #[test]
    fn clients_url_has_no_query() {
        assert_eq!(
            directory().clients_url().unwrap().as_str(),
            "https://api.example.com/prod/client"
        );
    }

    #[test]
    fn client_listing_is_parsed() {
        let clients = parse_clients(json!({
            "clients": [
                { "id": "c-1", "name": "Acme", "description": "Widgets", "createdAt": "2024-05-01T12:00:00Z" },
                { "name": "Initech" }
            ]
        }))
        .unwrap();

        let names: Vec<_> = clients.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Acme", "Initech"]);
        assert_eq!(clients[0].id.as_deref(), Some("c-1"));
        assert_eq!(clients[1].description, "");
    }

    #[test]
    fn client_listing_without_array_is_rejected() {
        assert!(matches!(
            parse_clients(json!([{ "name": "Acme" }])),
            Err(DirectoryError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn added_client_keeps_requested_description() {
        let client = parse_added_client(
            json!({ "message": "Client created", "client": { "id": "c-9", "name": "Globex" } }),
            "Energy",
        )
        .unwrap();

        assert_eq!(client.id.as_deref(), Some("c-9"));
        assert_eq!(client.name, "Globex");
        assert_eq!(client.description, "Energy");
        assert!(client.created_at.is_some());
    }

    #[test]
    fn registration_without_client_is_rejected() {
        assert!(matches!(
            parse_added_client(json!({ "message": "Client created" }), ""),
            Err(DirectoryError::UnexpectedResponse(_))
        ));
    }

    #[tokio::test]
    async fn signed_out_requests_fail_before_hitting_the_network() {
        let directory = HttpProposalDirectory::new(
            HttpDirectoryConfig::new("http://127.0.0.1:1"),
            Arc::new(MockTokenSource::new()),
        )
        .unwrap();

        let result = directory.list_proposals(None).await;

        assert!(matches!(result, Err(DirectoryError::Auth(_))));
    }
}
