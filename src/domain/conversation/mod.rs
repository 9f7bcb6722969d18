//! Conversation domain module.
//!
//! A conversation is one client+proposal chat thread: its identity, its
//! local message log, and whether it still owes the backend its one-time
//! initialization message.

mod conversation;
mod identity;
mod message;

pub use conversation::{Conversation, ConversationId};
pub use identity::ConversationIdentity;
pub use message::{ChatMessage, DeliveryStatus, MessageId, Sender};
