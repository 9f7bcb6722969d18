//! ConnectionManager - Owns the single transport connection.
//!
//! The manager is the only component that touches the socket. It opens the
//! connection for a conversation, writes outbound frames, probes liveness,
//! and turns transport events into [`ConnectionState`] changes and
//! connection-state notifications.
//!
//! # Tasks
//!
//! An open connection runs two tasks, both cancelled when the handle is
//! dropped:
//!
//! - the writer owns the sink and drains an unbounded queue of frames
//! - the reader pumps inbound text into the [`MessageRouter`] in arrival order
//!
//! A transport close or error observed by either task is reported together
//! with the connection's generation; reports for a superseded connection
//! are ignored.
//!
//! # Serialization
//!
//! Connect attempts are serialized by an async gate, so two concurrent
//! `connect` calls never race two transport attempts. `send` waits for an
//! in-flight connect to resolve before it looks at the state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::domain::connection::{ConnectionError, ConnectionState, OutboundEnvelope, ReusePolicy};
use crate::domain::conversation::ConversationIdentity;
use crate::domain::foundation::StateMachine;
use crate::ports::{Connector, FrameSink, FrameStream, OutboundFrame, TokenSource};

use super::listeners::{ListenerId, ListenerRegistry};
use super::message_router::MessageRouter;

/// Connection timing and reuse settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Base `ws://`/`wss://` URL; conversation fields are appended as query.
    pub websocket_url: String,
    /// Bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// Minimum spacing between two network-visible liveness probes.
    pub ping_debounce: Duration,
    pub reuse_policy: ReusePolicy,
}

impl ConnectionSettings {
    pub fn new(websocket_url: impl Into<String>) -> Self {
        Self {
            websocket_url: websocket_url.into(),
            connect_timeout: Duration::from_secs(15),
            ping_debounce: Duration::from_secs(20),
            reuse_policy: ReusePolicy::AnyOpen,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_ping_debounce(mut self, debounce: Duration) -> Self {
        self.ping_debounce = debounce;
        self
    }

    pub fn with_reuse_policy(mut self, policy: ReusePolicy) -> Self {
        self.reuse_policy = policy;
        self
    }
}

/// Exclusive owner of one open connection.
struct ConnectionHandle {
    opened_for: ConversationIdentity,
    generation: u64,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    _tasks: DropGuard,
}

#[derive(Default)]
struct LinkState {
    state: ConnectionState,
    handle: Option<ConnectionHandle>,
    /// Conversation outbound envelopes are addressed to.
    target: Option<ConversationIdentity>,
    generation: u64,
    last_probe: Option<Instant>,
}

impl LinkState {
    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        match self.state.transition_to(next) {
            Ok(state) => self.state = state,
            Err(e) => {
                tracing::warn!(
                    from = %self.state,
                    to = %next,
                    error = %e,
                    "Rejected state transition"
                );
            }
        }
    }

    /// Closes and discards the handle. Returns true if there was one.
    fn discard_handle(&mut self) -> bool {
        let had_handle = self.handle.take().is_some();
        if self.state.is_open() {
            self.transition(ConnectionState::Closing);
        }
        if self.state != ConnectionState::Idle {
            self.transition(ConnectionState::Closed);
        }
        self.last_probe = None;
        had_handle
    }
}

/// An in-flight connect attempt.
///
/// Dropped unsettled, it moves its generation from `Connecting` to `Closed`
/// and reports the connection down. This covers failures as well as a
/// caller that stops polling mid-attempt.
struct PendingAttempt<'a> {
    shared: &'a Shared,
    generation: u64,
    settled: bool,
}

impl PendingAttempt<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for PendingAttempt<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        {
            let mut link = self.shared.link();
            if link.generation != self.generation || link.state != ConnectionState::Connecting {
                return;
            }
            link.transition(ConnectionState::Closed);
        }
        tracing::debug!(generation = self.generation, "Connect attempt abandoned");
        self.shared.notify(false);
    }
}

/// State shared with the connection tasks.
struct Shared {
    link: Mutex<LinkState>,
    router: Arc<MessageRouter>,
    state_listeners: ListenerRegistry<bool>,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, connected: bool) {
        self.state_listeners.notify(&connected);
    }

    /// Transport close or error reported by a connection task.
    fn transport_closed(&self, generation: u64, reason: &str) {
        {
            let mut link = self.link();
            let current = link
                .handle
                .as_ref()
                .is_some_and(|handle| handle.generation == generation);
            if !current {
                tracing::trace!(generation, "Ignoring close of superseded connection");
                return;
            }
            link.handle = None;
            link.transition(ConnectionState::Closed);
            link.last_probe = None;
        }

        tracing::info!(generation, reason, "Connection closed");
        self.router.reset_connection_id();
        self.notify(false);
    }
}

/// Owns the transport connection to the chat backend.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    tokens: Arc<dyn TokenSource>,
    settings: ConnectionSettings,
    connect_gate: tokio::sync::Mutex<()>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        tokens: Arc<dyn TokenSource>,
        router: Arc<MessageRouter>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                link: Mutex::new(LinkState::default()),
                router,
                state_listeners: ListenerRegistry::new(),
            }),
            connector,
            tokens,
            settings,
            connect_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Connects to `identity`, returning false on any failure.
    pub async fn connect(&self, identity: &ConversationIdentity) -> bool {
        match self.try_connect(identity).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    client_name = identity.client_name(),
                    proposal_name = identity.proposal_name(),
                    error = %e,
                    "Connect failed"
                );
                false
            }
        }
    }

    /// Connects to `identity`.
    ///
    /// Reuses the open connection when the reuse policy allows it. Otherwise
    /// any existing handle is discarded and a new connection is opened,
    /// bounded by the connect timeout.
    ///
    /// # Errors
    ///
    /// - `ConnectTimeout` if the transport did not open in time
    /// - `ConnectRejected` if the handshake failed or the attempt was
    ///   superseded by `disconnect`
    pub async fn try_connect(
        &self,
        identity: &ConversationIdentity,
    ) -> Result<(), ConnectionError> {
        let _gate = self.connect_gate.lock().await;

        let (generation, dropped_open) = {
            let mut link = self.shared.link();

            if link.state.is_open() {
                let reusable = link.handle.as_ref().is_some_and(|handle| {
                    self.settings
                        .reuse_policy
                        .allows_reuse(&handle.opened_for, identity)
                });
                if reusable {
                    tracing::debug!(
                        client_name = identity.client_name(),
                        proposal_name = identity.proposal_name(),
                        "Reusing open connection"
                    );
                    link.target = Some(identity.clone());
                    return Ok(());
                }
            }

            let dropped_open = link.state.is_open() && link.handle.is_some();
            link.discard_handle();
            link.generation += 1;
            link.target = Some(identity.clone());
            link.transition(ConnectionState::Connecting);
            (link.generation, dropped_open)
        };

        if dropped_open {
            tracing::info!(generation, "Closed connection opened for another conversation");
            self.shared.router.reset_connection_id();
            self.shared.notify(false);
        }

        // Closes this generation if the attempt fails or its future is dropped.
        let attempt = PendingAttempt {
            shared: &self.shared,
            generation,
            settled: false,
        };

        let url = identity.endpoint_url(&self.settings.websocket_url);
        tracing::info!(
            client_name = identity.client_name(),
            proposal_name = identity.proposal_name(),
            generation,
            "Connecting"
        );

        let link = match tokio::time::timeout(
            self.settings.connect_timeout,
            self.connector.open(&url),
        )
        .await
        {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => return Err(ConnectionError::ConnectRejected(e.to_string())),
            Err(_) => return Err(ConnectionError::ConnectTimeout),
        };

        {
            let mut state = self.shared.link();
            if state.generation != generation {
                return Err(ConnectionError::ConnectRejected(
                    "connection attempt superseded".to_string(),
                ));
            }

            let cancel = CancellationToken::new();
            let (outbound, queue) = mpsc::unbounded_channel();
            let weak = Arc::downgrade(&self.shared);

            tokio::spawn(write_frames(
                weak.clone(),
                link.sink,
                queue,
                generation,
                cancel.clone(),
            ));
            tokio::spawn(read_frames(
                weak,
                Arc::clone(&self.shared.router),
                link.stream,
                generation,
                cancel.clone(),
            ));

            state.handle = Some(ConnectionHandle {
                opened_for: identity.clone(),
                generation,
                outbound,
                _tasks: cancel.drop_guard(),
            });
            state.last_probe = None;
            state.transition(ConnectionState::Open);
        }
        attempt.settle();

        tracing::info!(generation, "Connection open");
        self.shared.notify(true);
        Ok(())
    }

    /// Closes the connection, if any. Idempotent.
    ///
    /// An in-flight connect is abandoned: its result is discarded when it
    /// resolves.
    pub fn disconnect(&self) {
        let was_live = {
            let mut link = self.shared.link();
            let was_connecting = link.state == ConnectionState::Connecting;
            link.generation += 1;
            link.discard_handle() || was_connecting
        };

        self.shared.router.reset_connection_id();
        if was_live {
            tracing::info!("Disconnected");
            self.shared.notify(false);
        }
    }

    /// Sends `body` to the current conversation, returning false on any
    /// failure.
    pub async fn send(&self, body: &str) -> bool {
        match self.try_send(body).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Send failed");
                false
            }
        }
    }

    /// Sends `body` as a `message` envelope.
    ///
    /// The sender is resolved from the token source on every call. The frame
    /// counts as sent once the writer has accepted it.
    ///
    /// # Errors
    ///
    /// - `SendWhileDisconnected` if no connection is open, before or after
    ///   resolving the sender
    /// - `AuthUnavailable` if the token source fails
    /// - `WriteRejected` if the writer has already shut down
    pub async fn try_send(&self, body: &str) -> Result<(), ConnectionError> {
        drop(self.connect_gate.lock().await);

        let (target, generation) = {
            let link = self.shared.link();
            match (&link.handle, &link.target) {
                (Some(handle), Some(target)) if link.state.is_open() => {
                    (target.clone(), handle.generation)
                }
                _ => return Err(ConnectionError::SendWhileDisconnected),
            }
        };

        let sender = self.tokens.current_identity().await?;
        let text = OutboundEnvelope::message(&target, body, sender.email()).to_json()?;

        let link = self.shared.link();
        let handle = link
            .handle
            .as_ref()
            .filter(|handle| handle.generation == generation && link.state.is_open())
            .ok_or(ConnectionError::SendWhileDisconnected)?;

        handle
            .outbound
            .send(OutboundFrame::Text(text))
            .map_err(|_| ConnectionError::WriteRejected)?;

        tracing::debug!(
            client_name = target.client_name(),
            proposal_name = target.proposal_name(),
            generation,
            "Frame queued"
        );
        Ok(())
    }

    /// Liveness probe.
    ///
    /// Returns false if no connection is open. At most one ping frame is
    /// written per debounce window; calls inside the window report the known
    /// state without touching the network.
    pub fn ping(&self) -> bool {
        let mut link = self.shared.link();
        if !link.state.is_open() {
            return false;
        }

        let now = Instant::now();
        if let Some(last) = link.last_probe {
            if now.duration_since(last) < self.settings.ping_debounce {
                return true;
            }
        }
        link.last_probe = Some(now);

        match &link.handle {
            Some(handle) => {
                tracing::trace!(generation = handle.generation, "Liveness probe");
                handle.outbound.send(OutboundFrame::Ping).is_ok()
            }
            None => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.link().state.is_open()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.link().state
    }

    /// Conversation the open connection was opened for.
    pub fn connected_identity(&self) -> Option<ConversationIdentity> {
        self.shared
            .link()
            .handle
            .as_ref()
            .map(|handle| handle.opened_for.clone())
    }

    /// Registers a listener for connection-state changes.
    pub fn on_connection_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.shared.state_listeners.register(listener)
    }

    pub fn remove_connection_listener(&self, id: ListenerId) -> bool {
        self.shared.state_listeners.unregister(id)
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.shared.router
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.link().handle = None;
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

async fn write_frames(
    shared: Weak<Shared>,
    mut sink: FrameSink,
    mut queue: mpsc::UnboundedReceiver<OutboundFrame>,
    generation: u64,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = queue.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(frame).await {
                    tracing::warn!(generation, error = %e, "Write failed");
                    if let Some(shared) = shared.upgrade() {
                        shared.transport_closed(generation, "write failed");
                    }
                    return;
                }
            }
        }
    }

    if let Err(e) = sink.close().await {
        tracing::debug!(generation, error = %e, "Close handshake failed");
    }
}

async fn read_frames(
    shared: Weak<Shared>,
    router: Arc<MessageRouter>,
    mut stream: FrameStream,
    generation: u64,
    cancel: CancellationToken,
) {
    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            next = stream.next() => match next {
                Some(Ok(text)) => {
                    router.route(&text);
                }
                Some(Err(e)) => {
                    tracing::warn!(generation, error = %e, "Transport error");
                    break "transport error";
                }
                None => break "closed by peer",
            }
        }
    };

    if let Some(shared) = shared.upgrade() {
        shared.transport_closed(generation, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::MockTokenSource;
    use crate::adapters::websocket::{ConnectBehavior, InMemoryConnector};
    use crate::domain::connection::InboundFrame;
    use crate::domain::foundation::AuthError;

    const URL: &str = "wss://chat.example.com/prod";

    struct Fixture {
        manager: Arc<ConnectionManager>,
        connector: InMemoryConnector,
        tokens: Arc<MockTokenSource>,
        changes: Arc<Mutex<Vec<bool>>>,
    }

    fn fixture_with(connector: InMemoryConnector, settings: ConnectionSettings) -> Fixture {
        let tokens = Arc::new(MockTokenSource::signed_in("rep@example.com"));
        let manager = Arc::new(ConnectionManager::new(
            Arc::new(connector.clone()),
            tokens.clone(),
            Arc::new(MessageRouter::new()),
            settings,
        ));
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        manager.on_connection_change(move |connected| sink.lock().unwrap().push(*connected));
        Fixture {
            manager,
            connector,
            tokens,
            changes,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(InMemoryConnector::new(), ConnectionSettings::new(URL))
    }

    fn acme(proposal: &str) -> ConversationIdentity {
        ConversationIdentity::new("Acme Corp", proposal).unwrap()
    }

    /// Lets spawned connection tasks run.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test]
    async fn connect_opens_addressed_connection() {
        let f = fixture();

        assert!(f.manager.connect(&acme("Q3 Renewal")).await);

        assert!(f.manager.is_connected());
        assert_eq!(f.manager.state(), ConnectionState::Open);
        assert_eq!(
            f.connector.urls(),
            vec![format!(
                "{}?clientName=Acme%20Corp&proposalName=Q3%20Renewal",
                URL
            )]
        );
        assert_eq!(*f.changes.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn connect_twice_reuses_the_open_connection() {
        let f = fixture();

        assert!(f.manager.connect(&acme("Q3")).await);
        assert!(f.manager.connect(&acme("Q3")).await);

        assert_eq!(f.connector.connection_count(), 1);
        assert_eq!(*f.changes.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn any_open_policy_reuses_across_conversations() {
        let f = fixture();

        assert!(f.manager.connect(&acme("Q3")).await);
        assert!(f.manager.connect(&acme("Q4")).await);

        assert_eq!(f.connector.connection_count(), 1);
        assert_eq!(f.manager.connected_identity(), Some(acme("Q3")));
    }

    #[tokio::test]
    async fn reused_connection_addresses_the_latest_conversation() {
        let f = fixture();
        f.manager.connect(&acme("Q3")).await;
        f.manager.connect(&acme("Q4")).await;

        assert!(f.manager.send("hello").await);
        settle().await;

        let written = f.connector.last_peer().unwrap().written_json();
        assert_eq!(written[0]["proposalName"], "Q4");
    }

    #[tokio::test]
    async fn same_identity_policy_reconnects_on_mismatch() {
        let f = fixture_with(
            InMemoryConnector::new(),
            ConnectionSettings::new(URL).with_reuse_policy(ReusePolicy::SameIdentity),
        );

        assert!(f.manager.connect(&acme("Q3")).await);
        assert!(f.manager.connect(&acme("Q3")).await);
        assert!(f.manager.connect(&acme("Q4")).await);
        settle().await;

        assert_eq!(f.connector.connection_count(), 2);
        assert!(f.connector.peers()[0].client_dropped());
        assert_eq!(f.manager.connected_identity(), Some(acme("Q4")));
        assert_eq!(*f.changes.lock().unwrap(), vec![true, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_times_out_after_fifteen_seconds() {
        let f = fixture_with(
            InMemoryConnector::new().then(ConnectBehavior::Hang),
            ConnectionSettings::new(URL),
        );
        let started = Instant::now();

        let result = f.manager.try_connect(&acme("Q3")).await;

        assert_eq!(result, Err(ConnectionError::ConnectTimeout));
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert_eq!(f.manager.state(), ConnectionState::Closed);
        assert_eq!(f.manager.connected_identity(), None);
        assert_eq!(*f.changes.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn rejected_handshake_reports_failure() {
        let f = fixture_with(
            InMemoryConnector::new().then(ConnectBehavior::Reject("HTTP 403".into())),
            ConnectionSettings::new(URL),
        );

        let result = f.manager.try_connect(&acme("Q3")).await;

        assert!(matches!(result, Err(ConnectionError::ConnectRejected(_))));
        assert!(!f.manager.is_connected());
        assert_eq!(*f.changes.lock().unwrap(), vec![false]);

        assert!(f.manager.connect(&acme("Q3")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_connects_are_serialized() {
        let f = fixture_with(
            InMemoryConnector::new().then(ConnectBehavior::Hang),
            ConnectionSettings::new(URL),
        );

        let q3 = acme("Q3");
        let (first, second) = tokio::join!(f.manager.connect(&q3), f.manager.connect(&q3));

        // The first attempt times out; the second then opens a connection.
        assert!(!first);
        assert!(second);
        assert_eq!(f.connector.attempt_count(), 2);
        assert_eq!(f.connector.connection_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_connects_to_an_accepting_server_share_one_socket() {
        let f = fixture();

        let q3 = acme("Q3");
        let (first, second) = tokio::join!(f.manager.connect(&q3), f.manager.connect(&q3));

        assert!(first && second);
        assert_eq!(f.connector.attempt_count(), 1);
    }

    #[test]
    fn invalid_link_transition_is_rejected() {
        let mut link = LinkState::default();

        link.transition(ConnectionState::Open);
        assert_eq!(link.state, ConnectionState::Idle);

        link.transition(ConnectionState::Connecting);
        link.transition(ConnectionState::Open);
        assert_eq!(link.state, ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_connect_attempt_ends_closed() {
        let f = fixture_with(
            InMemoryConnector::new().then(ConnectBehavior::Hang),
            ConnectionSettings::new(URL),
        );
        let q3 = acme("Q3");

        tokio::select! {
            _ = f.manager.connect(&q3) => panic!("hanging connect resolved"),
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }

        assert_eq!(f.manager.state(), ConnectionState::Closed);
        assert_eq!(*f.changes.lock().unwrap(), vec![false]);

        // Nothing left to tear down
        f.manager.disconnect();
        assert_eq!(*f.changes.lock().unwrap(), vec![false]);

        assert!(f.manager.connect(&q3).await);
        assert!(f.manager.is_connected());
    }

    #[tokio::test]
    async fn disconnect_closes_and_notifies_once() {
        let f = fixture();
        f.manager.connect(&acme("Q3")).await;

        f.manager.disconnect();
        f.manager.disconnect();
        settle().await;

        assert_eq!(f.manager.state(), ConnectionState::Closed);
        assert!(f.connector.last_peer().unwrap().client_dropped());
        assert_eq!(*f.changes.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn disconnect_without_connection_is_silent() {
        let f = fixture();

        f.manager.disconnect();

        assert_eq!(f.manager.state(), ConnectionState::Idle);
        assert!(f.changes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_abandons_in_flight_connect() {
        let f = fixture_with(
            InMemoryConnector::new().then(ConnectBehavior::Hang),
            ConnectionSettings::new(URL),
        );
        let manager = f.manager.clone();
        let attempt = tokio::spawn(async move { manager.connect(&acme("Q3")).await });
        settle().await;

        f.manager.disconnect();
        assert_eq!(f.manager.state(), ConnectionState::Closed);

        assert!(!attempt.await.unwrap());
        assert_eq!(*f.changes.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn peer_close_marks_connection_closed() {
        let f = fixture();
        f.manager.connect(&acme("Q3")).await;

        f.connector.last_peer().unwrap().close();
        settle().await;

        assert!(!f.manager.is_connected());
        assert_eq!(f.manager.state(), ConnectionState::Closed);
        assert_eq!(*f.changes.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn transport_error_marks_connection_closed() {
        let f = fixture();
        f.manager.connect(&acme("Q3")).await;

        f.connector.last_peer().unwrap().fail("connection reset");
        settle().await;

        assert!(!f.manager.is_connected());
        assert_eq!(*f.changes.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn close_of_superseded_connection_is_ignored() {
        let f = fixture();
        f.manager.connect(&acme("Q3")).await;
        let old = f.connector.last_peer().unwrap();
        f.manager.disconnect();
        f.manager.connect(&acme("Q3")).await;

        old.close();
        settle().await;

        assert!(f.manager.is_connected());
    }

    #[tokio::test]
    async fn send_writes_envelope_with_current_sender() {
        let f = fixture();
        f.manager.connect(&acme("Q3")).await;

        assert!(f.manager.send("hello").await);
        settle().await;

        let written = f.connector.last_peer().unwrap().written_json();
        assert_eq!(
            written,
            vec![serde_json::json!({
                "action": "message",
                "clientName": "Acme Corp",
                "proposalName": "Q3",
                "body": "hello",
                "createdBy": "rep@example.com"
            })]
        );
    }

    #[tokio::test]
    async fn sender_is_resolved_on_every_send() {
        let f = fixture();
        f.manager.connect(&acme("Q3")).await;

        f.manager.send("one").await;
        f.tokens.sign_in(crate::domain::foundation::BearerIdentity::new(
            "other-token",
            "manager@example.com",
        ));
        f.manager.send("two").await;
        settle().await;

        let written = f.connector.last_peer().unwrap().written_json();
        assert_eq!(written[0]["createdBy"], "rep@example.com");
        assert_eq!(written[1]["createdBy"], "manager@example.com");
        assert_eq!(f.tokens.request_count(), 2);
    }

    #[tokio::test]
    async fn send_while_disconnected_fails_without_reconnecting() {
        let f = fixture();

        assert_eq!(
            f.manager.try_send("hello").await,
            Err(ConnectionError::SendWhileDisconnected)
        );
        assert_eq!(f.connector.attempt_count(), 0);
    }

    #[tokio::test]
    async fn auth_failure_aborts_send() {
        let f = fixture();
        f.manager.connect(&acme("Q3")).await;
        f.tokens.sign_out();

        assert_eq!(
            f.manager.try_send("hello").await,
            Err(ConnectionError::AuthUnavailable(AuthError::NotAuthenticated))
        );
        settle().await;
        assert!(f.connector.last_peer().unwrap().written().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn send_waits_for_in_flight_connect() {
        let f = fixture_with(
            InMemoryConnector::new().then(ConnectBehavior::Delay(Duration::from_secs(2))),
            ConnectionSettings::new(URL),
        );
        let manager = f.manager.clone();
        let connect = tokio::spawn(async move { manager.connect(&acme("Q3")).await });
        settle().await;
        assert_eq!(f.manager.state(), ConnectionState::Connecting);

        assert!(f.manager.send("hello").await);

        assert!(connect.await.unwrap());
        settle().await;
        assert_eq!(f.connector.last_peer().unwrap().written_json().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ping_is_debounced_for_twenty_seconds() {
        let f = fixture();
        f.manager.connect(&acme("Q3")).await;

        assert!(f.manager.ping());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(f.manager.ping());
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(f.manager.ping());
        settle().await;
        assert_eq!(f.connector.last_peer().unwrap().ping_count(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(f.manager.ping());
        settle().await;
        assert_eq!(f.connector.last_peer().unwrap().ping_count(), 2);
    }

    #[tokio::test]
    async fn ping_without_connection_is_false() {
        let f = fixture();
        assert!(!f.manager.ping());
    }

    #[tokio::test]
    async fn ping_does_not_repair_a_closed_connection() {
        let f = fixture();
        f.manager.connect(&acme("Q3")).await;
        f.connector.last_peer().unwrap().close();
        settle().await;

        assert!(!f.manager.ping());
        assert_eq!(f.connector.attempt_count(), 1);
    }

    #[tokio::test]
    async fn inbound_frames_reach_router_in_order() {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.manager
            .router()
            .on_message(move |frame| sink.lock().unwrap().push(frame.clone()));
        f.manager.connect(&acme("Q3")).await;

        let peer = f.connector.last_peer().unwrap();
        peer.push_text(r#"{"message":"F1"}"#);
        peer.push_text(r#"{"message":"F2","connectionId":"c-1"}"#);
        peer.push_text(r#"{"message":"F3"}"#);
        settle().await;

        let texts: Vec<_> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|frame| match frame {
                InboundFrame::ChatContent { text } => text.clone(),
                other => panic!("unexpected frame {:?}", other),
            })
            .collect();
        assert_eq!(texts, vec!["F1", "F2", "F3"]);
        assert_eq!(f.manager.router().last_connection_id().as_deref(), Some("c-1"));
    }

    #[tokio::test]
    async fn close_clears_connection_id() {
        let f = fixture();
        f.manager.connect(&acme("Q3")).await;
        let peer = f.connector.last_peer().unwrap();
        peer.push_text(r#"{"connectionId":"c-1"}"#);
        settle().await;

        peer.close();
        settle().await;

        assert_eq!(f.manager.router().last_connection_id(), None);
    }

    #[tokio::test]
    async fn rejected_write_closes_the_connection() {
        let f = fixture();
        f.manager.connect(&acme("Q3")).await;
        f.connector.last_peer().unwrap().reject_writes();

        assert!(f.manager.send("hello").await);
        settle().await;

        assert!(!f.manager.is_connected());
        assert!(!f.manager.send("again").await);
    }
}
