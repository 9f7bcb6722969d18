//! Chat message entity.
//!
//! Messages are records of user/AI exchanges within a conversation log.
//! Content and timestamp never change after construction; only the delivery
//! status of a user message moves as the network send resolves.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::foundation::Timestamp;

/// Unique identifier for a message within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random MessageId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The sales user at the keyboard.
    User,
    /// The AI backend.
    Ai,
}

/// Network delivery state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Shown locally, network send still in progress.
    Pending,
    /// Accepted by the transport (or received from it).
    Delivered,
    /// Every automatic attempt failed; shown to the user as not delivered.
    Undelivered,
}

/// A message within a conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    id: MessageId,
    sender: Sender,
    content: String,
    timestamp: Timestamp,
    delivery: DeliveryStatus,
}

impl ChatMessage {
    /// A user message, pending delivery.
    pub fn outgoing(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::User,
            content: content.into(),
            timestamp: Timestamp::now(),
            delivery: DeliveryStatus::Pending,
        }
    }

    /// An AI message, tagged with its arrival time.
    pub fn incoming(content: impl Into<String>) -> Self {
        Self::received(Sender::Ai, content, Timestamp::now())
    }

    /// A message that already exists on the server (history replay).
    pub fn received(sender: Sender, content: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            content: content.into(),
            timestamp,
            delivery: DeliveryStatus::Delivered,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn delivery(&self) -> DeliveryStatus {
        self.delivery
    }

    pub(crate) fn set_delivery(&mut self, status: DeliveryStatus) {
        self.delivery = status;
    }
}
