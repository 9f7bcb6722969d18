//! Conversation entity - a client+proposal scoped chat thread.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ChatMessage, ConversationIdentity, DeliveryStatus, MessageId};
use crate::domain::foundation::Timestamp;

/// Unique local identifier for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(Uuid);

impl ConversationId {
    /// Creates a new random ConversationId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConversationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Conversation entity - tracks the message log and pristine status of one
/// client+proposal thread.
///
/// # Invariants
///
/// - `identity` never changes
/// - `pristine` starts true only for locally created conversations and,
///   once cleared, is never set again
/// - the log only grows; a message appears at most once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    id: ConversationId,
    identity: ConversationIdentity,
    pristine: bool,
    messages: Vec<ChatMessage>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Conversation {
    /// A conversation created locally that still has to send its one-time
    /// initialization message.
    pub fn new_local(identity: ConversationIdentity) -> Self {
        let now = Timestamp::now();
        Self {
            id: ConversationId::new(),
            identity,
            pristine: true,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A conversation the backend already knows about.
    pub fn existing(identity: ConversationIdentity, created_at: Timestamp) -> Self {
        Self {
            id: ConversationId::new(),
            identity,
            pristine: false,
            messages: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    // === Accessors ===

    pub fn id(&self) -> ConversationId {
        self.id
    }

    pub fn identity(&self) -> &ConversationIdentity {
        &self.identity
    }

    pub fn is_pristine(&self) -> bool {
        self.pristine
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    pub fn message(&self, id: MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id() == id)
    }

    // === Mutations ===

    /// Claims the one-time initialization send.
    ///
    /// Returns true exactly once over the conversation's lifetime, and only
    /// if it was created pristine.
    pub fn claim_initialization(&mut self) -> bool {
        std::mem::replace(&mut self.pristine, false)
    }

    /// Appends a message to the log.
    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.updated_at = Timestamp::now();
    }

    /// Merges stored history ahead of the messages exchanged in this session.
    ///
    /// Entries already present (same sender, content and timestamp) are
    /// skipped, so loading the same history twice adds nothing. Returns the
    /// entries that were added, oldest first.
    pub fn merge_history(&mut self, history: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let added: Vec<ChatMessage> = history
            .into_iter()
            .filter(|stored| {
                !self.messages.iter().any(|m| {
                    m.sender() == stored.sender()
                        && m.content() == stored.content()
                        && m.timestamp() == stored.timestamp()
                })
            })
            .collect();

        if !added.is_empty() {
            self.messages.splice(0..0, added.iter().cloned());
            self.updated_at = Timestamp::now();
        }
        added
    }

    /// Updates the delivery status of a message already in the log.
    ///
    /// Returns false if no such message exists.
    pub fn mark_delivery(&mut self, id: MessageId, status: DeliveryStatus) -> bool {
        match self.messages.iter_mut().find(|m| m.id() == id) {
            Some(message) => {
                message.set_delivery(status);
                true
            }
            None => false,
        }
    }
}
