//! WebSocket transport backed by `tokio-tungstenite`.
//!
//! Maps the socket onto the transport port:
//!
//! - `OutboundFrame::Text` becomes a text message, `OutboundFrame::Ping` a
//!   protocol ping control frame
//! - inbound text messages are yielded as-is; a close frame ends the stream
//! - control frames are answered by tungstenite and never surface

use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::ports::{Connector, OutboundFrame, TransportError, TransportLink};

/// Opens `ws://` and `wss://` connections with tokio-tungstenite.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

fn to_message(frame: OutboundFrame) -> Message {
    match frame {
        OutboundFrame::Text(text) => Message::Text(text.into()),
        OutboundFrame::Ping => Message::Ping(Default::default()),
    }
}

fn from_message(message: Message) -> Option<Result<String, TransportError>> {
    match message {
        Message::Text(text) => Some(Ok(text.as_str().to_owned())),
        Message::Binary(bytes) => {
            tracing::debug!(len = bytes.len(), "Ignoring binary WebSocket frame");
            None
        }
        // Close is consumed by take_while; the rest are control frames.
        _ => None,
    }
}

fn transport_error(error: WsError) -> TransportError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        other => TransportError::Io(other.to_string()),
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn open(&self, url: &str) -> Result<TransportLink, TransportError> {
        let (socket, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        let (write, read) = socket.split();

        let sink = write
            .sink_map_err(transport_error)
            .with(|frame: OutboundFrame| future::ready(Ok::<_, TransportError>(to_message(frame))));

        let stream = read
            .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
            .filter_map(|message| {
                future::ready(match message {
                    Ok(message) => from_message(message),
                    Err(e) => Some(Err(transport_error(e))),
                })
            });

        Ok(TransportLink::new(Box::pin(sink), Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frame_becomes_text_message() {
        let message = to_message(OutboundFrame::Text("{\"action\":\"message\"}".into()));
        assert!(matches!(message, Message::Text(t) if t.as_str() == "{\"action\":\"message\"}"));
    }

    #[test]
    fn ping_frame_becomes_protocol_ping() {
        assert!(matches!(to_message(OutboundFrame::Ping), Message::Ping(_)));
    }

    #[test]
    fn only_text_messages_are_yielded() {
        assert_eq!(
            from_message(Message::Text("hello".into())),
            Some(Ok("hello".to_string()))
        );
        assert_eq!(from_message(Message::Pong(Default::default())), None);
        assert_eq!(from_message(Message::Binary(vec![1u8, 2, 3].into())), None);
    }

    #[test]
    fn closed_socket_errors_map_to_closed() {
        assert_eq!(transport_error(WsError::ConnectionClosed), TransportError::Closed);
        assert_eq!(transport_error(WsError::AlreadyClosed), TransportError::Closed);
        assert!(matches!(
            transport_error(WsError::Io(std::io::Error::other("connection reset"))),
            TransportError::Io(_)
        ));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_handshake_error() {
        let result = TungsteniteConnector::new().open("ws://127.0.0.1:1").await;
        assert!(matches!(result, Err(TransportError::Handshake(_))));
    }
}
