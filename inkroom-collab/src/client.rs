//! WebSocket client for the drawing server.
//!
//! Provides:
//! - Connection lifecycle (connect, close)
//! - Room join, stroke send and clear
//! - Decoded server events on a channel
//!
//! Strokes drawn while disconnected are dropped, never queued: a
//! reconnecting client re-joins and gets the full history instead.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use inkroom_core::{RoomId, StrokeEvent, StrokeSegment};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{ClientMessage, ProtocolError, ServerMessage};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasEvent {
    /// Connection established
    Connected,
    /// Connection lost
    Disconnected,
    /// Full room history, sent once per join
    History(Vec<StrokeEvent>),
    /// Stroke drawn by another member of the room
    RemoteStroke(StrokeSegment),
    /// The room was cleared
    Cleared,
    /// The server refused our last input
    Rejected(String),
}

pub struct CanvasClient {
    server_url: String,
    /// Sent as the `Origin` header, like a browser would
    origin: Option<String>,
    state: Arc<RwLock<ConnectionState>>,
    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<Message>>,
    event_rx: Option<mpsc::Receiver<CanvasEvent>>,
    event_tx: mpsc::Sender<CanvasEvent>,
    room: Option<RoomId>,
}

impl CanvasClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            server_url: server_url.into(),
            origin: None,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
            room: None,
        }
    }

    /// Present `origin` during the handshake.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<CanvasEvent>> {
        self.event_rx.take()
    }

    /// Connect to the server and spawn the reader/writer tasks.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let mut request = self.server_url.as_str().into_client_request()?;
        if let Some(origin) = &self.origin {
            let value = HeaderValue::from_str(origin)
                .map_err(|e| ProtocolError::InvalidRequest(e.to_string()))?;
            request.headers_mut().insert(header::ORIGIN, value);
        }

        let ws_stream = match tokio_tungstenite::connect_async(request).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(e.into());
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward outgoing channel to WebSocket
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if ws_writer.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(CanvasEvent::Connected).await;

        // Reader task: decode server events
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match ServerMessage::decode(text.as_str()) {
                        Ok(server_msg) => {
                            if event_tx.send(server_msg.into()).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => log::warn!("Ignoring server frame: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            // Connection lost
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(CanvasEvent::Disconnected).await;
        });

        // Re-join after a reconnect
        if let Some(room) = self.room.clone() {
            self.send(&ClientMessage::JoinRoom(room)).await?;
        }

        Ok(())
    }

    /// Join (or switch to) `room`. The server answers with its history.
    pub async fn join_room(&mut self, room: RoomId) -> Result<(), ProtocolError> {
        self.room = Some(room.clone());
        self.send(&ClientMessage::JoinRoom(room)).await
    }

    /// Send one stroke segment to the current room.
    pub async fn draw(&self, segment: StrokeSegment) -> Result<(), ProtocolError> {
        segment.validate()?;
        self.send(&ClientMessage::Drawing(segment)).await
    }

    /// Ask the server to clear the current room.
    pub async fn clear(&self) -> Result<(), ProtocolError> {
        self.send(&ClientMessage::ClearCanvas).await
    }

    /// Send a raw text frame, bypassing client-side validation.
    pub async fn send_raw(&self, text: impl Into<String>) -> Result<(), ProtocolError> {
        self.push(Message::text(text.into())).await
    }

    /// Close the connection.
    pub async fn close(&mut self) {
        if let Some(tx) = self.outgoing_tx.take() {
            let _ = tx.send(Message::Close(None)).await;
        }
        *self.state.write().await = ConnectionState::Disconnected;
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    async fn send(&self, msg: &ClientMessage) -> Result<(), ProtocolError> {
        let text = msg.encode()?;
        self.push(Message::text(text)).await
    }

    async fn push(&self, msg: Message) -> Result<(), ProtocolError> {
        match &self.outgoing_tx {
            Some(tx) => tx.send(msg).await.map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }
}

impl From<ServerMessage> for CanvasEvent {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::DrawingHistory(events) => CanvasEvent::History(events),
            ServerMessage::Drawing(segment) => CanvasEvent::RemoteStroke(segment),
            ServerMessage::CanvasCleared => CanvasEvent::Cleared,
            ServerMessage::Rejected(rejection) => CanvasEvent::Rejected(rejection.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkroom_core::Tool;

    #[tokio::test]
    async fn test_client_starts_disconnected() {
        let mut client = CanvasClient::new("ws://127.0.0.1:1");
        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert!(client.take_event_rx().is_some());
        assert!(client.take_event_rx().is_none());
        assert!(client.room().is_none());
    }

    #[tokio::test]
    async fn test_send_while_disconnected_fails() {
        let client = CanvasClient::new("ws://127.0.0.1:1");
        assert!(matches!(
            client.draw(Tool::Pen.dot(1.0, 1.0)).await,
            Err(ProtocolError::ConnectionClosed)
        ));
        assert!(matches!(client.clear().await, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_invalid_stroke_is_refused_locally() {
        let client = CanvasClient::new("ws://127.0.0.1:1");
        let mut segment = Tool::Pen.dot(1.0, 1.0);
        segment.size = 0.0;
        assert!(matches!(
            client.draw(segment).await,
            Err(ProtocolError::InvalidStroke(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_resets_state() {
        // Port 1 is never listening in the test environment
        let mut client = CanvasClient::new("ws://127.0.0.1:1");
        assert!(client.connect().await.is_err());
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[test]
    fn test_server_message_to_event() {
        assert_eq!(CanvasEvent::from(ServerMessage::CanvasCleared), CanvasEvent::Cleared);
        assert_eq!(
            CanvasEvent::from(ServerMessage::rejected("nope")),
            CanvasEvent::Rejected("nope".into())
        );
    }
}
