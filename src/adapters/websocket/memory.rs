//! In-memory transport for tests.
//!
//! Each `open` call consumes the next scripted [`ConnectBehavior`] (falling
//! back to the default once the script is empty). Every accepted connection
//! gets a [`PeerHandle`] that plays the server side: it pushes inbound text,
//! closes or fails the connection, and records what the client wrote.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::sink;

use crate::ports::{Connector, OutboundFrame, TransportError, TransportLink};

/// Outcome of one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Open the connection immediately.
    Accept,
    /// Fail the handshake with the given reason.
    Reject(String),
    /// Never complete the handshake.
    Hang,
    /// Open the connection after a delay.
    Delay(Duration),
}

/// Scriptable connector that never touches the network.
#[derive(Debug, Clone)]
pub struct InMemoryConnector {
    script: Arc<Mutex<VecDeque<ConnectBehavior>>>,
    fallback: Arc<Mutex<ConnectBehavior>>,
    urls: Arc<Mutex<Vec<String>>>,
    peers: Arc<Mutex<Vec<PeerHandle>>>,
}

impl Default for InMemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConnector {
    /// Creates a connector that accepts every attempt.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new(ConnectBehavior::Accept)),
            urls: Arc::new(Mutex::new(Vec::new())),
            peers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queues the behavior of the next attempt.
    pub fn then(self, behavior: ConnectBehavior) -> Self {
        self.script.lock().unwrap().push_back(behavior);
        self
    }

    /// Queues the behavior of the next attempt on a shared connector.
    pub fn push_behavior(&self, behavior: ConnectBehavior) {
        self.script.lock().unwrap().push_back(behavior);
    }

    /// Sets the behavior used once the script is exhausted.
    pub fn set_default(&self, behavior: ConnectBehavior) {
        *self.fallback.lock().unwrap() = behavior;
    }

    /// Number of `open` calls so far.
    pub fn attempt_count(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    /// URLs passed to `open`, in order.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    /// Number of connections that were accepted.
    pub fn connection_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// Server side of the most recently accepted connection.
    pub fn last_peer(&self) -> Option<PeerHandle> {
        self.peers.lock().unwrap().last().cloned()
    }

    /// Server side of every accepted connection, oldest first.
    pub fn peers(&self) -> Vec<PeerHandle> {
        self.peers.lock().unwrap().clone()
    }

    fn next_behavior(&self) -> ConnectBehavior {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn open(&self, url: &str) -> Result<TransportLink, TransportError> {
        self.urls.lock().unwrap().push(url.to_string());

        match self.next_behavior() {
            ConnectBehavior::Accept => {
                let (peer, link) = PeerHandle::pair(url);
                self.peers.lock().unwrap().push(peer);
                Ok(link)
            }
            ConnectBehavior::Reject(reason) => Err(TransportError::Handshake(reason)),
            ConnectBehavior::Hang => futures::future::pending().await,
            ConnectBehavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                let (peer, link) = PeerHandle::pair(url);
                self.peers.lock().unwrap().push(peer);
                Ok(link)
            }
        }
    }
}

/// Server side of one in-memory connection.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    url: String,
    inbound: mpsc::UnboundedSender<Result<String, TransportError>>,
    written: Arc<Mutex<Vec<OutboundFrame>>>,
    writable: Arc<AtomicBool>,
    closed_by_peer: Arc<AtomicBool>,
    write_attempts: Arc<AtomicUsize>,
}

impl PeerHandle {
    fn pair(url: &str) -> (Self, TransportLink) {
        let (tx, rx) = mpsc::unbounded();
        let peer = Self {
            url: url.to_string(),
            inbound: tx,
            written: Arc::new(Mutex::new(Vec::new())),
            writable: Arc::new(AtomicBool::new(true)),
            closed_by_peer: Arc::new(AtomicBool::new(false)),
            write_attempts: Arc::new(AtomicUsize::new(0)),
        };

        let state = peer.clone();
        let sink = sink::unfold(state, |state: PeerHandle, frame: OutboundFrame| async move {
            state.write_attempts.fetch_add(1, Ordering::SeqCst);
            if !state.writable.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            state.written.lock().unwrap().push(frame);
            Ok(state)
        });

        (peer, TransportLink::new(Box::pin(sink), Box::pin(rx)))
    }

    /// The URL the client connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Delivers a text frame to the client. Returns false if the client
    /// side has gone away.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.inbound.unbounded_send(Ok(text.into())).is_ok()
    }

    /// Closes the connection from the server side.
    pub fn close(&self) {
        self.closed_by_peer.store(true, Ordering::SeqCst);
        self.writable.store(false, Ordering::SeqCst);
        self.inbound.close_channel();
    }

    /// Fails the connection with a transport error.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self
            .inbound
            .unbounded_send(Err(TransportError::Io(reason.into())));
        self.close();
    }

    /// Makes every further write fail while leaving reads open.
    pub fn reject_writes(&self) {
        self.writable.store(false, Ordering::SeqCst);
    }

    /// True once the client dropped its read half.
    pub fn client_dropped(&self) -> bool {
        self.inbound.is_closed() && !self.closed_by_peer.load(Ordering::SeqCst)
    }

    /// Every frame the client wrote successfully.
    pub fn written(&self) -> Vec<OutboundFrame> {
        self.written.lock().unwrap().clone()
    }

    /// Text frames the client wrote, parsed as JSON.
    pub fn written_json(&self) -> Vec<serde_json::Value> {
        self.written()
            .into_iter()
            .filter_map(|frame| match frame {
                OutboundFrame::Text(text) => serde_json::from_str(&text).ok(),
                OutboundFrame::Ping => None,
            })
            .collect()
    }

    /// Number of ping frames the client wrote.
    pub fn ping_count(&self) -> usize {
        self.written()
            .iter()
            .filter(|frame| matches!(frame, OutboundFrame::Ping))
            .count()
    }

    /// Number of writes attempted, including rejected ones.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};

    #[tokio::test]
    async fn accepted_connection_carries_frames_both_ways() {
        let connector = InMemoryConnector::new();
        let mut link = connector.open("ws://test").await.unwrap();
        let peer = connector.last_peer().unwrap();

        link.sink
            .send(OutboundFrame::Text("out".into()))
            .await
            .unwrap();
        assert!(peer.push_text("in"));

        assert_eq!(peer.written(), vec![OutboundFrame::Text("out".into())]);
        assert_eq!(link.stream.next().await, Some(Ok("in".to_string())));
    }

    #[tokio::test]
    async fn scripted_rejection_fails_the_attempt() {
        let connector = InMemoryConnector::new().then(ConnectBehavior::Reject("HTTP 403".into()));

        let first = connector.open("ws://test").await;
        let second = connector.open("ws://test").await;

        assert_eq!(
            first.unwrap_err(),
            TransportError::Handshake("HTTP 403".into())
        );
        assert!(second.is_ok());
        assert_eq!(connector.attempt_count(), 2);
        assert_eq!(connector.connection_count(), 1);
    }

    #[tokio::test]
    async fn peer_close_ends_the_stream() {
        let connector = InMemoryConnector::new();
        let mut link = connector.open("ws://test").await.unwrap();

        connector.last_peer().unwrap().close();

        assert_eq!(link.stream.next().await, None);
    }

    #[tokio::test]
    async fn rejected_writes_error() {
        let connector = InMemoryConnector::new();
        let mut link = connector.open("ws://test").await.unwrap();
        let peer = connector.last_peer().unwrap();

        peer.reject_writes();

        assert_eq!(
            link.sink.send(OutboundFrame::Ping).await,
            Err(TransportError::Closed)
        );
        assert_eq!(peer.write_attempts(), 1);
        assert!(peer.written().is_empty());
    }

    #[tokio::test]
    async fn dropping_the_link_is_visible_to_the_peer() {
        let connector = InMemoryConnector::new();
        let link = connector.open("ws://test").await.unwrap();
        let peer = connector.last_peer().unwrap();

        assert!(!peer.client_dropped());
        drop(link);
        assert!(peer.client_dropped());
    }
}
