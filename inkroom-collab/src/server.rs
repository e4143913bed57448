//! WebSocket gateway in front of the sync engine.
//!
//! Architecture:
//! ```text
//! Client A ──┐                        ┌── MembershipRegistry
//!             ├── handshake (Origin) ──┤
//! Client B ──┘          │              └── ConnectionHub ── outbox per client
//!                       ▼
//!                  SyncEngine ──► EventStore (RocksDB / memory)
//! ```
//!
//! One task per connection. It feeds decoded text frames to the engine one
//! at a time and drains the connection's outbox into the socket.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, StatusCode};
use tokio_tungstenite::tungstenite::Message;

use crate::config::{AllowedOrigins, ServerConfig};
use crate::engine::{EngineStats, Inbound, SyncEngine};
use crate::protocol::{ClientMessage, ProtocolError};
use crate::storage::{EventStore, MemoryEventStore, RocksEventStore, StoreError};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub refused_handshakes: u64,
    pub total_messages: u64,
    pub malformed_messages: u64,
    pub total_bytes: u64,
}

/// The drawing server.
pub struct SyncServer {
    config: ServerConfig,
    engine: Arc<SyncEngine>,
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    /// Open the configured event store and build the server.
    ///
    /// Failing to open the store is fatal: the caller should not listen.
    pub fn new(config: ServerConfig) -> Result<Self, StoreError> {
        let store = open_store(&config)?;
        Ok(Self::with_store(config, store))
    }

    /// Build the server around an already opened store.
    pub fn with_store(config: ServerConfig, store: Arc<dyn EventStore>) -> Self {
        let engine = Arc::new(SyncEngine::new(store, config.engine_config()));
        Self {
            config,
            engine,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), BoxError> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        self.serve(listener).await
    }

    /// Accept connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), BoxError> {
        log::info!("Drawing server listening on {}", listener.local_addr()?);

        match self.engine.store().list_rooms().await {
            Ok(rooms) => log::info!("{} rooms with persisted strokes", rooms.len()),
            Err(e) => log::warn!("Could not list persisted rooms: {e}"),
        }

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let engine = self.engine.clone();
            let stats = self.stats.clone();
            let origins = self.config.allowed_origins.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, engine, stats, origins).await
                {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        engine: Arc<SyncEngine>,
        stats: Arc<RwLock<ServerStats>>,
        origins: AllowedOrigins,
    ) -> Result<(), BoxError> {
        let check_origin = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let origin = req
                .headers()
                .get(header::ORIGIN)
                .and_then(|value| value.to_str().ok());
            if origins.allows(origin) {
                Ok(resp)
            } else {
                log::warn!("Refused handshake from {addr}: origin {origin:?} not allowed");
                let mut refusal = ErrorResponse::new(Some("Origin not allowed".to_string()));
                *refusal.status_mut() = StatusCode::FORBIDDEN;
                Err(refusal)
            }
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, check_origin).await {
            Ok(ws) => ws,
            Err(e) => {
                stats.write().await.refused_handshakes += 1;
                return Err(e.into());
            }
        };
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let (conn, mut outbox) = engine.connect().await;
        log::info!("WebSocket connection {conn} established from {addr}");

        let result: Result<(), ProtocolError> = async {
            loop {
                tokio::select! {
                    // Incoming WebSocket message
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                {
                                    let mut s = stats.write().await;
                                    s.total_messages += 1;
                                    s.total_bytes += text.len() as u64;
                                }
                                match ClientMessage::decode(text.as_str()) {
                                    Ok(client_msg) => engine.handle(conn, client_msg.into()).await,
                                    Err(e) => {
                                        log::warn!("Dropping message from {conn}: {e}");
                                        stats.write().await.malformed_messages += 1;
                                        engine.reject(conn, &e.to_string()).await;
                                    }
                                }
                            }

                            Some(Ok(Message::Binary(_))) => {
                                let e = ProtocolError::UnsupportedFrame("binary");
                                log::warn!("Dropping message from {conn}: {e}");
                                stats.write().await.malformed_messages += 1;
                                engine.reject(conn, &e.to_string()).await;
                            }

                            Some(Ok(Message::Ping(data))) => {
                                ws_sender.send(Message::Pong(data)).await?;
                            }

                            Some(Ok(Message::Close(_))) | None => {
                                log::info!("Connection {conn} closed from {addr}");
                                return Ok(());
                            }

                            Some(Err(e)) => return Err(e.into()),

                            _ => {}
                        }
                    }

                    // Outgoing frame queued by the engine
                    frame = outbox.recv() => {
                        match frame {
                            Some(frame) => {
                                ws_sender.send(Message::text(frame.to_string())).await?;
                            }
                            None => return Err(ProtocolError::ConnectionClosed),
                        }
                    }
                }
            }
        }
        .await;

        engine.handle(conn, Inbound::Disconnect).await;
        stats.write().await.active_connections -= 1;

        result.map_err(Into::into)
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub async fn engine_stats(&self) -> EngineStats {
        self.engine.stats().await
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Open the event store selected by `config`.
pub fn open_store(config: &ServerConfig) -> Result<Arc<dyn EventStore>, StoreError> {
    if config.in_memory {
        log::warn!("Using in-memory event store; strokes will not survive a restart");
        return Ok(Arc::new(MemoryEventStore::new()));
    }
    let store_config = config.store_config();
    log::info!("Opening event store at {}", store_config.path.display());
    Ok(Arc::new(RocksEventStore::open(store_config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkroom_core::{RoomId, StrokeEvent, Tool};

    fn memory_config() -> ServerConfig {
        ServerConfig {
            in_memory: true,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_server_creation_in_memory() {
        let server = SyncServer::new(memory_config()).unwrap();
        assert_eq!(server.config().listen_addr(), "0.0.0.0:5000");
        assert!(!server.engine().config().reject_misuse);
    }

    #[tokio::test]
    async fn test_server_with_rocks_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            store_path: dir.path().to_path_buf(),
            database: "boards".to_string(),
            ..ServerConfig::default()
        };
        let server = SyncServer::new(config).unwrap();
        assert!(dir.path().join("boards").exists());

        let room = RoomId::new("r1").unwrap();
        server
            .engine()
            .store()
            .append(StrokeEvent::new(room.clone(), Tool::Pen.dot(1.0, 1.0), 0))
            .await
            .unwrap();
        assert_eq!(server.engine().store().list_rooms().await.unwrap(), vec![room]);
    }

    #[tokio::test]
    async fn test_store_open_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let config = ServerConfig {
            store_path: blocker,
            ..ServerConfig::default()
        };
        assert!(SyncServer::new(config).is_err());
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = SyncServer::new(memory_config()).unwrap();
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.refused_handshakes, 0);
        assert_eq!(stats.total_messages, 0);

        let engine_stats = server.engine_stats().await;
        assert_eq!(engine_stats.active_rooms, 0);
        assert_eq!(engine_stats.hub.connections, 0);
    }
}
