//! # inkroom-collab: Real-time room synchronization for Inkroom
//!
//! Clients join a named room over WebSocket, relay pen/eraser strokes to the
//! other members, and receive the room's full history on join.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     WebSocket      ┌─────────────┐
//! │ CanvasClient │ ◄────────────────► │ SyncServer  │
//! │ (per user)   │     JSON events    │ (gateway)   │
//! └──────────────┘                    └──────┬──────┘
//!                                            │ Inbound
//!                                            ▼
//!                                     ┌─────────────┐
//!                                     │ SyncEngine  │
//!                                     └──┬───────┬──┘
//!                   ┌────────────────────┘       └──────────┐
//!                   ▼                                       ▼
//!   ┌───────────────────────────────┐             ┌──────────────────┐
//!   │ MembershipRegistry            │             │ EventStore       │
//!   │ ConnectionHub (outboxes)      │             │ RocksDB / memory │
//!   └───────────────────────────────┘             └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON wire events and connection identity
//! - [`registry`]: connection → room membership
//! - [`hub`]: per-connection outboxes and room-addressed fan-out
//! - [`storage`]: stroke event stores
//! - [`engine`]: join / stroke / clear / disconnect state machine
//! - [`config`]: environment-driven server configuration
//! - [`server`]: WebSocket gateway
//! - [`client`]: WebSocket client

pub mod protocol;
pub mod registry;
pub mod hub;
pub mod storage;
pub mod engine;
pub mod config;
pub mod server;
pub mod client;

// Re-exports for convenience
pub use protocol::{ClientMessage, ConnectionId, ProtocolError, Rejection, ServerMessage};
pub use registry::MembershipRegistry;
pub use hub::{ConnectionHub, Frame, HubStats};
pub use storage::{
    EventStore, MemoryEventStore, MonotonicClock, RocksEventStore, RoomMetadata, StoreConfig,
    StoreError, UNSTAMPED,
};
pub use engine::{EngineConfig, EngineStats, Inbound, SyncEngine};
pub use config::{AllowedOrigins, ConfigError, ServerConfig};
pub use server::{open_store, ServerStats, SyncServer};
pub use client::{CanvasClient, CanvasEvent, ConnectionState};
