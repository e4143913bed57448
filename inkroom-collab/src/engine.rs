//! Synchronization engine: the per-connection protocol state machine.
//!
//! ```text
//!              join(r)                 join(r')
//! UNJOINED ───────────► JOINED(r) ───────────────► JOINED(r')
//!    ▲                     │ stroke / clear            │
//!    │    disconnect       ▼                           │
//!    └───────────── (leave registry) ◄─────────────────┘
//! ```
//!
//! Registry and hub live behind one lock that is never held across a store
//! call. Awaiting the store is where other connections interleave.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use inkroom_core::{RoomId, StrokeEvent, StrokeSegment};
use tokio::sync::{mpsc, Mutex};

use crate::hub::{ConnectionHub, Frame, HubStats};
use crate::protocol::{ClientMessage, ConnectionId, ServerMessage};
use crate::registry::MembershipRegistry;
use crate::storage::{EventStore, UNSTAMPED};

/// One inbound command for the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Join(RoomId),
    Stroke(StrokeSegment),
    Clear,
    /// Transport closed or failed.
    Disconnect,
}

impl From<ClientMessage> for Inbound {
    fn from(msg: ClientMessage) -> Self {
        match msg {
            ClientMessage::JoinRoom(room) => Inbound::Join(room),
            ClientMessage::Drawing(segment) => Inbound::Stroke(segment),
            ClientMessage::ClearCanvas => Inbound::Clear,
        }
    }
}

/// Engine behavior switches.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Answer misuse and malformed input with a `rejected` event instead of
    /// dropping it silently.
    pub reject_misuse: bool,
    /// History size at which a join logs a warning.
    pub history_warn_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reject_misuse: false,
            history_warn_threshold: 10_000,
        }
    }
}

/// Engine counters plus a snapshot of registry and hub state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub joins: u64,
    pub strokes: u64,
    pub persist_failures: u64,
    pub clears: u64,
    pub discarded: u64,
    pub active_rooms: usize,
    pub joined_connections: usize,
    pub hub: HubStats,
}

#[derive(Default)]
struct AtomicEngineStats {
    joins: AtomicU64,
    strokes: AtomicU64,
    persist_failures: AtomicU64,
    clears: AtomicU64,
    discarded: AtomicU64,
}

#[derive(Default)]
struct EngineState {
    registry: MembershipRegistry,
    hub: ConnectionHub,
}

impl EngineState {
    fn emit_to_room(&mut self, room: &RoomId, except: Option<ConnectionId>, frame: Frame) -> usize {
        let EngineState { registry, hub } = self;
        hub.emit_to_room(registry, room, except, frame)
    }
}

pub struct SyncEngine {
    state: Mutex<EngineState>,
    store: Arc<dyn EventStore>,
    config: EngineConfig,
    stats: AtomicEngineStats,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn EventStore>, config: EngineConfig) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            store,
            config,
            stats: AtomicEngineStats::default(),
        }
    }

    /// Register a new connection in the `UNJOINED` state. The receiver yields
    /// every frame addressed to it.
    pub async fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Frame>) {
        let conn = ConnectionId::new();
        let rx = self.state.lock().await.hub.register(conn);
        log::debug!("Connection {conn} registered");
        (conn, rx)
    }

    /// Dispatch one inbound command. Commands of a single connection must be
    /// handed in one at a time, in arrival order.
    pub async fn handle(&self, conn: ConnectionId, msg: Inbound) {
        match msg {
            Inbound::Join(room) => self.join(conn, room).await,
            Inbound::Stroke(segment) => self.stroke(conn, segment).await,
            Inbound::Clear => self.clear(conn).await,
            Inbound::Disconnect => self.disconnect(conn).await,
        }
    }

    /// Tell `conn` its input was refused, when configured to. Otherwise the
    /// input is just counted as discarded.
    pub async fn reject(&self, conn: ConnectionId, reason: &str) {
        self.stats.discarded.fetch_add(1, Ordering::Relaxed);
        if !self.config.reject_misuse {
            return;
        }
        match ServerMessage::rejected(reason).encode() {
            Ok(text) => {
                self.state.lock().await.hub.send(conn, Frame::from(text));
            }
            Err(e) => log::error!("Failed to encode rejection for {conn}: {e}"),
        }
    }

    async fn join(&self, conn: ConnectionId, room: RoomId) {
        {
            let mut state = self.state.lock().await;
            if !state.hub.is_registered(conn) {
                log::warn!("Join from unknown connection {conn}");
                return;
            }
            if let Some(left) = state.registry.join(conn, room.clone()) {
                log::debug!("Connection {conn} left room {left}");
            }
            // Live frames for the joiner wait until its history is out.
            state.hub.hold(conn);
        }
        self.stats.joins.fetch_add(1, Ordering::Relaxed);
        log::info!("Connection {conn} joined room {room}");

        let history = match self.store.query_history(&room).await {
            Ok(history) => {
                if history.len() >= self.config.history_warn_threshold {
                    log::warn!("Room {room} replays {} events on join", history.len());
                }
                match ServerMessage::DrawingHistory(history).encode() {
                    Ok(text) => Some(Frame::from(text)),
                    Err(e) => {
                        log::error!("Failed to encode history for room {room}: {e}");
                        None
                    }
                }
            }
            Err(e) => {
                log::error!("Failed to load history for room {room}: {e}");
                None
            }
        };

        let mut state = self.state.lock().await;
        let flushed = state.hub.release(conn, history);
        if flushed > 0 {
            log::debug!("Flushed {flushed} live frames to {conn} after history");
        }
    }

    async fn stroke(&self, conn: ConnectionId, segment: StrokeSegment) {
        let Some(room) = self.room_of(conn).await else {
            log::debug!("Stroke from unjoined connection {conn} discarded");
            self.reject(conn, "join a room before drawing").await;
            return;
        };
        if let Err(e) = segment.validate() {
            log::warn!("Invalid stroke from {conn}: {e}");
            self.reject(conn, &e.to_string()).await;
            return;
        }
        self.stats.strokes.fetch_add(1, Ordering::Relaxed);

        let event = StrokeEvent::new(room.clone(), segment.clone(), UNSTAMPED);
        match self.store.append(event).await {
            Ok(stored) => log::trace!("Stored stroke in room {room} at {}", stored.timestamp),
            Err(e) => {
                self.stats.persist_failures.fetch_add(1, Ordering::Relaxed);
                log::error!("Failed to persist stroke for room {room}: {e}");
            }
        }

        let frame = match ServerMessage::Drawing(segment).encode() {
            Ok(text) => Frame::from(text),
            Err(e) => {
                log::error!("Failed to encode stroke for room {room}: {e}");
                return;
            }
        };
        let queued = self.state.lock().await.emit_to_room(&room, Some(conn), frame);
        log::debug!("Relayed stroke from {conn} to {queued} peers in room {room}");
    }

    async fn clear(&self, conn: ConnectionId) {
        let Some(room) = self.room_of(conn).await else {
            log::debug!("Clear from unjoined connection {conn} discarded");
            self.reject(conn, "join a room before clearing").await;
            return;
        };

        match self.store.clear_room(&room).await {
            Ok(deleted) => {
                self.stats.clears.fetch_add(1, Ordering::Relaxed);
                log::info!("Room {room} cleared by {conn} ({deleted} events deleted)");
            }
            Err(e) => {
                log::error!("Failed to clear room {room}: {e}");
                return;
            }
        }

        match ServerMessage::CanvasCleared.encode() {
            Ok(text) => {
                self.state
                    .lock()
                    .await
                    .emit_to_room(&room, None, Frame::from(text));
            }
            Err(e) => log::error!("Failed to encode clear for room {room}: {e}"),
        }
    }

    async fn disconnect(&self, conn: ConnectionId) {
        let mut state = self.state.lock().await;
        let left = state.registry.leave(conn);
        state.hub.unregister(conn);
        match left {
            Some(room) => log::info!("Connection {conn} disconnected from room {room}"),
            None => log::debug!("Connection {conn} disconnected"),
        }
    }

    pub async fn room_of(&self, conn: ConnectionId) -> Option<RoomId> {
        self.state.lock().await.registry.room_of(conn).cloned()
    }

    pub async fn members_of(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.state.lock().await.registry.members_of(room)
    }

    pub async fn stats(&self) -> EngineStats {
        let state = self.state.lock().await;
        EngineStats {
            joins: self.stats.joins.load(Ordering::Relaxed),
            strokes: self.stats.strokes.load(Ordering::Relaxed),
            persist_failures: self.stats.persist_failures.load(Ordering::Relaxed),
            clears: self.stats.clears.load(Ordering::Relaxed),
            discarded: self.stats.discarded.load(Ordering::Relaxed),
            active_rooms: state.registry.room_count(),
            joined_connections: state.registry.connection_count(),
            hub: state.hub.stats(),
        }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
