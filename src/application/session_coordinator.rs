//! SessionCoordinator - Binds conversations to the live connection.
//!
//! Owns the conversation catalogue and the single active binding. Activating
//! a conversation connects it, arms the keep-alive loop and, for a pristine
//! conversation, schedules its one-time initialization send after a short
//! settle delay. User sends are echoed into the local log first and then
//! delivered with at most one reconnect-and-retry cycle.
//!
//! # Binding lifecycle
//!
//! ```text
//! Unbound -> Connecting -> Pristine -> Established
//!    ^           |             |            |
//!    +-----------+-------------+------------+   (switch, remove, deactivate)
//! ```
//!
//! Every binding carries an epoch and a cancellation guard. Replacing or
//! dropping the binding cancels its keep-alive loop and any pending settle
//! delay; work that completes for a superseded epoch is discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::domain::connection::{ConnectionError, InboundFrame};
use crate::domain::conversation::{
    ChatMessage, Conversation, ConversationId, ConversationIdentity, DeliveryStatus, MessageId,
    Sender,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{DirectoryError, ProposalDirectory, StoredMessage};

use super::connection_manager::ConnectionManager;
use super::listeners::{ListenerId, ListenerRegistry};

/// Default text of the one-time initialization message.
pub const DEFAULT_INITIALIZATION_MESSAGE: &str = "Create Proposal";

/// Session timing settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Period of the keep-alive loop.
    pub keep_alive_interval: Duration,
    /// Pause between connecting and the initialization send.
    pub settle_delay: Duration,
    pub initialization_message: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_secs(45),
            settle_delay: Duration::from_millis(500),
            initialization_message: DEFAULT_INITIALIZATION_MESSAGE.to_string(),
        }
    }
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ConnectionChanged {
        connected: bool,
    },
    /// The advisor status changed; `None` means it was cleared.
    StatusChanged {
        status: Option<String>,
    },
    MessageAppended {
        conversation_id: ConversationId,
        message: ChatMessage,
    },
    DeliveryChanged {
        conversation_id: ConversationId,
        message_id: MessageId,
        status: DeliveryStatus,
    },
    ConversationsChanged,
}

/// Where the active binding stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    /// The activating connect has not resolved yet.
    Connecting,
    /// Bound; the initialization send has not been attempted.
    Pristine,
    Established,
}

/// Outcome of a user send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub status: DeliveryStatus,
    /// Why delivery failed, if it did.
    pub failure: Option<ConnectionError>,
}

/// Session-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    #[error("No active conversation")]
    NoActiveConversation,

    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

struct Binding {
    conversation_id: ConversationId,
    identity: ConversationIdentity,
    epoch: u64,
    connecting: bool,
    _tasks: DropGuard,
}

#[derive(Default)]
struct SessionState {
    /// Newest first.
    conversations: Vec<Conversation>,
    binding: Option<Binding>,
    status: Option<String>,
    epoch: u64,
}

impl SessionState {
    fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id() == id)
    }

    fn conversation_mut(&mut self, id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id() == id)
    }

    fn binding_for(&self, epoch: u64) -> Option<&Binding> {
        self.binding.as_ref().filter(|b| b.epoch == epoch)
    }

    /// Drops the binding. Returns true if a shown status was cleared.
    fn unbind(&mut self) -> bool {
        if let Some(binding) = self.binding.take() {
            tracing::debug!(conversation_id = %binding.conversation_id, "Unbinding conversation");
        }
        self.status.take().is_some()
    }
}

struct Inner {
    connection: Arc<ConnectionManager>,
    directory: Option<Arc<dyn ProposalDirectory>>,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    events: ListenerRegistry<SessionEvent>,
    frame_listener: ListenerId,
    connection_listener: ListenerId,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        self.events.notify(&event);
    }

    fn bound_identity(&self, epoch: u64) -> Option<ConversationIdentity> {
        self.state().binding_for(epoch).map(|b| b.identity.clone())
    }

    fn directory(&self) -> Result<&Arc<dyn ProposalDirectory>, SessionError> {
        self.directory
            .as_ref()
            .ok_or(SessionError::Directory(DirectoryError::NotConfigured))
    }

    fn handle_frame(&self, frame: &InboundFrame) {
        let mut events = Vec::new();
        {
            let mut state = self.state();
            match frame {
                InboundFrame::AdvisorStatus { text } => {
                    tracing::debug!(status = %text, "Advisor status");
                    state.status = Some(text.clone());
                    events.push(SessionEvent::StatusChanged {
                        status: Some(text.clone()),
                    });
                }
                InboundFrame::ChatContent { text } if text.is_empty() => {
                    tracing::debug!("Ignoring empty chat content");
                }
                InboundFrame::ChatContent { text } => {
                    let Some(conversation_id) = state.binding.as_ref().map(|b| b.conversation_id)
                    else {
                        tracing::debug!("Chat content arrived with no bound conversation");
                        return;
                    };
                    let message = ChatMessage::incoming(text.clone());
                    let Some(conversation) = state.conversation_mut(conversation_id) else {
                        return;
                    };
                    conversation.append(message.clone());
                    events.push(SessionEvent::MessageAppended {
                        conversation_id,
                        message,
                    });
                    if state.status.take().is_some() {
                        events.push(SessionEvent::StatusChanged { status: None });
                    }
                }
                InboundFrame::Unrecognized => {
                    tracing::trace!("Ignoring frame without message");
                }
            }
        }

        for event in events {
            self.emit(event);
        }
    }

    fn set_delivery(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        status: DeliveryStatus,
    ) {
        let updated = self
            .state()
            .conversation_mut(conversation_id)
            .is_some_and(|c| c.mark_delivery(message_id, status));
        if updated {
            self.emit(SessionEvent::DeliveryChanged {
                conversation_id,
                message_id,
                status,
            });
        }
    }

    /// Delivers `content` for `identity`: one reconnect if disconnected, then
    /// one reconnect-and-resend if the first send fails.
    async fn deliver(
        &self,
        identity: &ConversationIdentity,
        content: &str,
    ) -> Result<(), ConnectionError> {
        let connection = &self.connection;

        if !connection.is_connected() {
            tracing::debug!("Not connected, reconnecting before send");
            connection.try_connect(identity).await?;
        }

        let first = match connection.try_send(content).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        tracing::warn!(error = %first, "Send failed, reconnecting and retrying once");

        if let Err(e) = connection.try_connect(identity).await {
            tracing::warn!(error = %e, "Reconnect for retry failed");
            return Err(ConnectionError::DoubleSendFailure);
        }
        connection.try_send(content).await.map_err(|e| {
            tracing::warn!(error = %e, "Retry failed");
            ConnectionError::DoubleSendFailure
        })
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.connection.router().remove_listener(self.frame_listener);
        self.connection
            .remove_connection_listener(self.connection_listener);
    }
}

/// Coordinates conversations on top of the [`ConnectionManager`].
#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

impl SessionCoordinator {
    pub fn new(
        connection: Arc<ConnectionManager>,
        directory: Option<Arc<dyn ProposalDirectory>>,
        settings: SessionSettings,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let frames = weak.clone();
            let frame_listener = connection.router().on_message(move |frame| {
                if let Some(inner) = frames.upgrade() {
                    inner.handle_frame(frame);
                }
            });

            let changes = weak.clone();
            let connection_listener = connection.on_connection_change(move |connected| {
                if let Some(inner) = changes.upgrade() {
                    inner.emit(SessionEvent::ConnectionChanged {
                        connected: *connected,
                    });
                }
            });

            Inner {
                connection,
                directory,
                settings,
                state: Mutex::new(SessionState::default()),
                events: ListenerRegistry::new(),
                frame_listener,
                connection_listener,
            }
        });

        Self { inner }
    }

    /// Registers a listener for session events.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.events.register(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.events.unregister(id)
    }

    // === Catalogue ===

    /// Adds a locally created, pristine conversation at the top of the
    /// catalogue.
    pub fn create_conversation(&self, identity: ConversationIdentity) -> ConversationId {
        let conversation = Conversation::new_local(identity);
        let id = conversation.id();
        self.inner.state().conversations.insert(0, conversation);
        tracing::info!(conversation_id = %id, "Created conversation");
        self.inner.emit(SessionEvent::ConversationsChanged);
        id
    }

    /// Adds a conversation the backend already knows, or returns the one
    /// already catalogued for `identity`.
    pub fn open_conversation(
        &self,
        identity: ConversationIdentity,
        created_at: Timestamp,
    ) -> ConversationId {
        let id = {
            let mut state = self.inner.state();
            if let Some(existing) = state.conversations.iter().find(|c| *c.identity() == identity) {
                return existing.id();
            }
            let conversation = Conversation::existing(identity, created_at);
            let id = conversation.id();
            state.conversations.insert(0, conversation);
            id
        };
        self.inner.emit(SessionEvent::ConversationsChanged);
        id
    }

    /// Removes a conversation, unbinding it if it is active.
    pub fn remove_conversation(&self, id: ConversationId) -> Result<(), SessionError> {
        let status_cleared = {
            let mut state = self.inner.state();
            let index = state
                .conversations
                .iter()
                .position(|c| c.id() == id)
                .ok_or(SessionError::ConversationNotFound(id))?;
            state.conversations.remove(index);

            let bound = state.binding.as_ref().is_some_and(|b| b.conversation_id == id);
            bound && state.unbind()
        };

        if status_cleared {
            self.inner.emit(SessionEvent::StatusChanged { status: None });
        }
        self.inner.emit(SessionEvent::ConversationsChanged);
        Ok(())
    }

    /// Snapshot of the catalogue, newest first.
    pub fn conversations(&self) -> Vec<Conversation> {
        self.inner.state().conversations.clone()
    }

    pub fn conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.inner.state().conversation(id).cloned()
    }

    pub fn find_conversation(&self, identity: &ConversationIdentity) -> Option<ConversationId> {
        self.inner
            .state()
            .conversations
            .iter()
            .find(|c| c.identity() == identity)
            .map(Conversation::id)
    }

    // === Binding ===

    /// Binds `id` and connects it.
    ///
    /// Any previous binding is dropped, which cancels its keep-alive loop and
    /// pending initialization; its connection is left alone. The keep-alive
    /// loop is armed for the new binding whether or not the connect
    /// succeeds. Returns whether the connect succeeded.
    pub async fn activate(&self, id: ConversationId) -> Result<bool, SessionError> {
        let inner = &self.inner;

        let (identity, epoch, cancel, status_cleared) = {
            let mut state = inner.state();
            let identity = state
                .conversation(id)
                .ok_or(SessionError::ConversationNotFound(id))?
                .identity()
                .clone();

            let status_cleared = state.unbind();
            state.epoch += 1;
            let epoch = state.epoch;
            let cancel = CancellationToken::new();

            tokio::spawn(keep_alive(
                Arc::downgrade(inner),
                epoch,
                cancel.clone(),
                inner.settings.keep_alive_interval,
            ));

            state.binding = Some(Binding {
                conversation_id: id,
                identity: identity.clone(),
                epoch,
                connecting: true,
                _tasks: cancel.clone().drop_guard(),
            });
            (identity, epoch, cancel, status_cleared)
        };

        if status_cleared {
            inner.emit(SessionEvent::StatusChanged { status: None });
        }

        tracing::info!(
            conversation_id = %id,
            client_name = identity.client_name(),
            proposal_name = identity.proposal_name(),
            "Activating conversation"
        );

        let connected = inner.connection.connect(&identity).await;

        let schedule_initialization = {
            let mut state = inner.state();
            match state.binding.as_mut().filter(|b| b.epoch == epoch) {
                Some(binding) => binding.connecting = false,
                None => {
                    tracing::debug!(conversation_id = %id, "Activation superseded");
                    return Ok(connected);
                }
            }
            connected && state.conversation(id).is_some_and(Conversation::is_pristine)
        };

        if schedule_initialization {
            tokio::spawn(send_initialization(
                Arc::downgrade(inner),
                id,
                epoch,
                cancel,
                inner.settings.settle_delay,
            ));
        }

        Ok(connected)
    }

    /// Drops the active binding, leaving the connection open.
    pub fn deactivate(&self) {
        let status_cleared = self.inner.state().unbind();
        if status_cleared {
            self.inner.emit(SessionEvent::StatusChanged { status: None });
        }
    }

    /// Drops the active binding and closes the connection.
    pub fn shutdown(&self) {
        self.deactivate();
        self.inner.connection.disconnect();
    }

    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.inner.state().binding.as_ref().map(|b| b.conversation_id)
    }

    pub fn binding_state(&self) -> BindingState {
        let state = self.inner.state();
        match &state.binding {
            None => BindingState::Unbound,
            Some(binding) if binding.connecting => BindingState::Connecting,
            Some(binding) => match state.conversation(binding.conversation_id) {
                Some(c) if c.is_pristine() => BindingState::Pristine,
                _ => BindingState::Established,
            },
        }
    }

    // === Messaging ===

    /// Sends user input to the active conversation.
    ///
    /// The message is appended to the local log as pending before any
    /// network work and then marked delivered or undelivered. It appears in
    /// the log once, however many attempts delivery takes.
    ///
    /// # Errors
    ///
    /// - `EmptyMessage` for blank input
    /// - `NoActiveConversation` if nothing is bound
    ///
    /// Delivery failures are reported in the receipt, not as errors.
    pub async fn send(&self, content: &str) -> Result<SendReceipt, SessionError> {
        if content.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let (conversation_id, identity, message) = {
            let mut state = self.inner.state();
            let (conversation_id, identity) = state
                .binding
                .as_ref()
                .map(|b| (b.conversation_id, b.identity.clone()))
                .ok_or(SessionError::NoActiveConversation)?;
            let message = ChatMessage::outgoing(content);
            state
                .conversation_mut(conversation_id)
                .ok_or(SessionError::ConversationNotFound(conversation_id))?
                .append(message.clone());
            (conversation_id, identity, message)
        };
        let message_id = message.id();

        self.inner.emit(SessionEvent::MessageAppended {
            conversation_id,
            message,
        });

        let failure = self.inner.deliver(&identity, content).await.err();
        let status = match &failure {
            None => DeliveryStatus::Delivered,
            Some(e) => {
                tracing::warn!(conversation_id = %conversation_id, error = %e, "Message not delivered");
                DeliveryStatus::Undelivered
            }
        };
        self.inner.set_delivery(conversation_id, message_id, status);

        Ok(SendReceipt {
            conversation_id,
            message_id,
            status,
            failure,
        })
    }

    /// The advisor status currently shown, if any.
    pub fn status(&self) -> Option<String> {
        self.inner.state().status.clone()
    }

    /// True when input can be sent: connected and no advisor status shown.
    pub fn can_compose(&self) -> bool {
        self.inner.connection.is_connected() && self.inner.state().status.is_none()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.inner.connection
    }

    // === Directory ===

    /// Syncs the catalogue with the proposal directory.
    ///
    /// Server-known conversations of `client_name` (or of every client) that
    /// the listing no longer contains are removed; listed proposals not yet
    /// catalogued are added. Pristine conversations are kept. An empty
    /// listing leaves the catalogue untouched. Returns the listing size.
    pub async fn load_proposals(&self, client_name: Option<&str>) -> Result<usize, SessionError> {
        let proposals = self.inner.directory()?.list_proposals(client_name).await?;
        if proposals.is_empty() {
            tracing::debug!(client_name, "Proposal listing is empty, keeping catalogue");
            return Ok(0);
        }

        let listed: Vec<(ConversationIdentity, Timestamp)> = proposals
            .iter()
            .filter_map(|p| {
                match ConversationIdentity::new(p.client_name.as_str(), p.proposal_name.as_str()) {
                    Ok(identity) => Some((identity, p.created_at)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping proposal with invalid identity");
                        None
                    }
                }
            })
            .collect();

        let status_cleared = {
            let mut state = self.inner.state();
            let in_scope = |c: &Conversation| {
                client_name.map_or(true, |name| c.identity().client_name() == name)
            };
            state.conversations.retain(|c| {
                !in_scope(c) || c.is_pristine() || listed.iter().any(|(i, _)| i == c.identity())
            });

            for (identity, created_at) in &listed {
                if !state.conversations.iter().any(|c| c.identity() == identity) {
                    state
                        .conversations
                        .push(Conversation::existing(identity.clone(), *created_at));
                }
            }

            let bound_removed = state
                .binding
                .as_ref()
                .is_some_and(|b| state.conversation(b.conversation_id).is_none());
            bound_removed && state.unbind()
        };

        tracing::info!(client_name, count = listed.len(), "Loaded proposals");
        if status_cleared {
            self.inner.emit(SessionEvent::StatusChanged { status: None });
        }
        self.inner.emit(SessionEvent::ConversationsChanged);
        Ok(proposals.len())
    }

    /// Merges the stored history of a conversation into its log. Returns the
    /// number of messages added.
    pub async fn load_history(&self, id: ConversationId) -> Result<usize, SessionError> {
        let directory = self.inner.directory()?;
        let identity = self
            .conversation(id)
            .ok_or(SessionError::ConversationNotFound(id))?
            .identity()
            .clone();

        let stored = directory.fetch_messages(&identity).await?;
        let history = stored.into_iter().map(history_message).collect();

        let added = self
            .inner
            .state()
            .conversation_mut(id)
            .ok_or(SessionError::ConversationNotFound(id))?
            .merge_history(history);

        tracing::debug!(conversation_id = %id, added = added.len(), "Loaded history");
        let count = added.len();
        for message in added {
            self.inner.emit(SessionEvent::MessageAppended {
                conversation_id: id,
                message,
            });
        }
        Ok(count)
    }
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("binding", &self.binding_state())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

/// Stored messages written by a person carry their email in `createdBy`.
fn history_message(stored: StoredMessage) -> ChatMessage {
    let sender = match (stored.kind.as_deref(), stored.created_by.as_deref()) {
        (Some("ai"), _) => Sender::Ai,
        (_, Some(created_by)) if created_by.contains('@') => Sender::User,
        _ => Sender::Ai,
    };
    ChatMessage::received(sender, stored.message, stored.created_at)
}

async fn keep_alive(weak: Weak<Inner>, epoch: u64, cancel: CancellationToken, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let Some(inner) = weak.upgrade() else { return };
        let Some(identity) = inner.bound_identity(epoch) else {
            return;
        };

        if inner.connection.is_connected() {
            let alive = inner.connection.ping();
            tracing::trace!(epoch, alive, "Keep-alive check");
            continue;
        }

        tracing::debug!(epoch, "Keep-alive found connection down, reconnecting");
        tokio::select! {
            _ = cancel.cancelled() => return,
            connected = inner.connection.connect(&identity) => {
                tracing::debug!(epoch, connected, "Keep-alive reconnect");
            }
        }
    }
}

async fn send_initialization(
    weak: Weak<Inner>,
    id: ConversationId,
    epoch: u64,
    cancel: CancellationToken,
    settle_delay: Duration,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(settle_delay) => {}
    }

    let Some(inner) = weak.upgrade() else { return };
    let claimed = {
        let mut state = inner.state();
        if state.binding_for(epoch).is_none() {
            return;
        }
        state
            .conversation_mut(id)
            .is_some_and(Conversation::claim_initialization)
    };
    if !claimed {
        return;
    }

    let sent = inner
        .connection
        .send(&inner.settings.initialization_message)
        .await;
    tracing::info!(conversation_id = %id, sent, "Initialization message attempted");
}
