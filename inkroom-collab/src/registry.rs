//! Room membership registry.
//!
//! The only owner of "which connection is in which room". Membership is a
//! function from connection to room: [`MembershipRegistry::join`] leaves the
//! previous room and enters the new one in a single call, so a connection is
//! never observed in two rooms or half-way between them.
//!
//! Purely in-memory and process-scoped; membership is never persisted.

use std::collections::{BTreeSet, HashMap};

use inkroom_core::RoomId;

use crate::protocol::ConnectionId;

#[derive(Debug, Default)]
pub struct MembershipRegistry {
    /// connection → current room
    current: HashMap<ConnectionId, RoomId>,
    /// room → members (empty rooms are dropped)
    rooms: HashMap<RoomId, BTreeSet<ConnectionId>>,
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `conn` into `room`, leaving its previous room first.
    ///
    /// Returns the room that was left, if any. Joining the room the
    /// connection is already in leaves and re-enters it.
    pub fn join(&mut self, conn: ConnectionId, room: RoomId) -> Option<RoomId> {
        let left = self.leave(conn);
        self.rooms.entry(room.clone()).or_default().insert(conn);
        self.current.insert(conn, room);
        left
    }

    /// Remove `conn` from its current room. No-op when not joined.
    pub fn leave(&mut self, conn: ConnectionId) -> Option<RoomId> {
        let room = self.current.remove(&conn)?;
        if let Some(members) = self.rooms.get_mut(&room) {
            members.remove(&conn);
            if members.is_empty() {
                self.rooms.remove(&room);
            }
        }
        Some(room)
    }

    pub fn room_of(&self, conn: ConnectionId) -> Option<&RoomId> {
        self.current.get(&conn)
    }

    /// Current members of `room`, in a stable order.
    pub fn members_of(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, conn: ConnectionId, room: &RoomId) -> bool {
        self.current.get(&conn) == Some(room)
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of connections currently joined to some room.
    pub fn connection_count(&self) -> usize {
        self.current.len()
    }
}
