//! In-process event store. Nothing survives a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use inkroom_core::{RoomId, StrokeEvent};
use tokio::sync::RwLock;

use super::{EventStore, MonotonicClock, StoreError, UNSTAMPED};

#[derive(Debug, Default)]
pub struct MemoryEventStore {
    rooms: RwLock<HashMap<RoomId, Vec<StrokeEvent>>>,
    clock: MonotonicClock,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total events across all rooms.
    pub async fn len(&self) -> usize {
        self.rooms.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, mut event: StrokeEvent) -> Result<StrokeEvent, StoreError> {
        if event.timestamp == UNSTAMPED {
            event.timestamp = self.clock.next();
        } else {
            self.clock.observe(event.timestamp);
        }

        let mut rooms = self.rooms.write().await;
        let events = rooms.entry(event.room_id.clone()).or_default();
        // Keep ascending order; equal timestamps stay in insertion order.
        let at = events.partition_point(|e| e.timestamp <= event.timestamp);
        events.insert(at, event.clone());
        Ok(event)
    }

    async fn query_history(&self, room: &RoomId) -> Result<Vec<StrokeEvent>, StoreError> {
        Ok(self
            .rooms
            .read()
            .await
            .get(room)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear_room(&self, room: &RoomId) -> Result<u64, StoreError> {
        let removed = self.rooms.write().await.remove(room);
        Ok(removed.map_or(0, |events| events.len() as u64))
    }

    async fn list_rooms(&self) -> Result<Vec<RoomId>, StoreError> {
        let mut rooms: Vec<RoomId> = self.rooms.read().await.keys().cloned().collect();
        rooms.sort();
        Ok(rooms)
    }
}
