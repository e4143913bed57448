//! Stroke event persistence.
//!
//! ```text
//! ┌─────────────┐   append / query / clear   ┌──────────────────┐
//! │ SyncEngine  │ ─────────────────────────► │ dyn EventStore   │
//! └─────────────┘                            └────────┬─────────┘
//!                                     ┌───────────────┴──────────────┐
//!                                     ▼                              ▼
//!                           ┌──────────────────┐          ┌──────────────────┐
//!                           │ RocksEventStore  │          │ MemoryEventStore │
//!                           │ CF "events"      │          │ (tests, dev)     │
//!                           │ CF "rooms"       │          └──────────────────┘
//!                           │ CF "meta"        │
//!                           └──────────────────┘
//! ```
//!
//! The store is append / delete-all only. Events are never updated in place,
//! which is what makes history replay a deterministic fold.

pub mod memory;
pub mod rocks;

pub use memory::MemoryEventStore;
pub use rocks::{RocksEventStore, RoomMetadata, StoreConfig};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use inkroom_core::{RoomId, StrokeEvent};

/// Timestamp value meaning "not stamped yet".
pub const UNSTAMPED: u64 = 0;

/// Ordered, room-filterable stroke event store.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event, stamping it with a server timestamp when its
    /// timestamp is [`UNSTAMPED`]. Returns the event as stored.
    async fn append(&self, event: StrokeEvent) -> Result<StrokeEvent, StoreError>;

    /// Every event of `room`, ascending by insertion time.
    ///
    /// Unbounded: long-lived rooms return their whole history.
    async fn query_history(&self, room: &RoomId) -> Result<Vec<StrokeEvent>, StoreError>;

    /// Delete every event of `room`. Returns how many were deleted.
    async fn clear_room(&self, room: &RoomId) -> Result<u64, StoreError>;

    /// Rooms that currently have persisted events.
    async fn list_rooms(&self) -> Result<Vec<RoomId>, StoreError>;
}

/// Storage errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::IoError(e.to_string())
    }
}

/// Millisecond wall clock that never repeats or goes backwards.
///
/// Each reading is `max(now, last + 1)`, so timestamps are strictly
/// increasing in the order they are handed out even when the system clock
/// stalls or steps back.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicU64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume after `last` (e.g. the highest timestamp found on disk).
    pub fn starting_after(last: u64) -> Self {
        Self {
            last: AtomicU64::new(last),
        }
    }

    pub fn next(&self) -> u64 {
        let now = now_millis();
        let mut current = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(current.saturating_add(1));
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return candidate,
                Err(actual) => current = actual,
            }
        }
    }

    /// Make sure later readings come after an externally assigned timestamp.
    pub fn observe(&self, timestamp: u64) {
        self.last.fetch_max(timestamp, Ordering::SeqCst);
    }

    pub fn last(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
