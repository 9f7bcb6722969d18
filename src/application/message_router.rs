//! MessageRouter - Demultiplexes inbound frames to listeners.
//!
//! Every raw text payload the connection receives goes through
//! [`MessageRouter::route`]. Well-formed payloads are classified and handed
//! to every listener in registration order, on the caller's task, so
//! listeners observe frames in transport delivery order. Malformed payloads
//! are logged and dropped.

use std::sync::{Mutex, PoisonError};

use crate::domain::connection::{DecodedFrame, InboundFrame};

use super::listeners::{ListenerId, ListenerRegistry};

/// Routes decoded inbound frames to registered listeners.
#[derive(Debug, Default)]
pub struct MessageRouter {
    listeners: ListenerRegistry<InboundFrame>,
    last_connection_id: Mutex<Option<String>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for every successfully decoded frame.
    pub fn on_message<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&InboundFrame) + Send + Sync + 'static,
    {
        self.listeners.register(listener)
    }

    /// Removes a listener registered with [`on_message`](Self::on_message).
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    /// Decodes one raw payload and delivers it.
    ///
    /// Returns the delivered frame, or `None` if the payload was dropped.
    pub fn route(&self, raw: &str) -> Option<InboundFrame> {
        let decoded = match DecodedFrame::decode(raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(error = %e, len = raw.len(), "Dropping malformed inbound frame");
                return None;
            }
        };

        if let Some(connection_id) = decoded.connection_id {
            tracing::trace!(connection_id = %connection_id, "Observed connection id");
            *self.connection_id_slot() = Some(connection_id);
        }

        self.listeners.notify(&decoded.frame);
        Some(decoded.frame)
    }

    /// The most recent correlation id seen on an inbound frame.
    pub fn last_connection_id(&self) -> Option<String> {
        self.connection_id_slot().clone()
    }

    /// Forgets the correlation id (the connection it belonged to is gone).
    pub fn reset_connection_id(&self) {
        *self.connection_id_slot() = None;
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn connection_id_slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.last_connection_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
