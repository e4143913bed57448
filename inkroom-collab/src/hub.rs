//! Connection hub: per-connection outboxes and room-addressed fan-out.
//!
//! Each connection owns an unbounded outbox drained by its WebSocket writer,
//! so fan-out never waits on a slow peer. Frames are encoded once and shared
//! as `Arc<str>` across every recipient.
//!
//! A connection can be put on *hold* while its history snapshot is loading.
//! Frames addressed to it meanwhile are parked and flushed right after the
//! snapshot, so a live stroke never lands before the history that would wipe
//! it on the client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use inkroom_core::RoomId;
use tokio::sync::mpsc;

use crate::protocol::ConnectionId;
use crate::registry::MembershipRegistry;

/// One encoded server message.
pub type Frame = Arc<str>;

/// Statistics for monitoring fan-out health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub connections: usize,
}

/// Lock-free counters, read through [`ConnectionHub::stats`].
#[derive(Default)]
struct AtomicHubStats {
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
}

struct Outbox {
    tx: mpsc::UnboundedSender<Frame>,
    /// `Some` while the connection waits for its history snapshot.
    held: Option<Vec<Frame>>,
}

#[derive(Default)]
pub struct ConnectionHub {
    outboxes: HashMap<ConnectionId, Outbox>,
    stats: Arc<AtomicHubStats>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the outbox for a new connection and return its receiving end.
    pub fn register(&mut self, conn: ConnectionId) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outboxes.insert(conn, Outbox { tx, held: None });
        rx
    }

    /// Drop the outbox; any parked frames are discarded.
    pub fn unregister(&mut self, conn: ConnectionId) -> bool {
        self.outboxes.remove(&conn).is_some()
    }

    pub fn is_registered(&self, conn: ConnectionId) -> bool {
        self.outboxes.contains_key(&conn)
    }

    pub fn connection_count(&self) -> usize {
        self.outboxes.len()
    }

    /// Queue a frame for one connection. Returns false when it is gone.
    pub fn send(&mut self, conn: ConnectionId, frame: Frame) -> bool {
        let Some(outbox) = self.outboxes.get_mut(&conn) else {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        if let Some(held) = outbox.held.as_mut() {
            held.push(frame);
            return true;
        }
        Self::deliver(&self.stats, outbox, frame)
    }

    /// Room-addressed broadcast: every current member of `room` except
    /// `except`. Returns the number of connections the frame was queued for.
    pub fn emit_to_room(
        &mut self,
        registry: &MembershipRegistry,
        room: &RoomId,
        except: Option<ConnectionId>,
        frame: Frame,
    ) -> usize {
        let mut queued = 0;
        for member in registry.members_of(room) {
            if Some(member) == except {
                continue;
            }
            if self.send(member, frame.clone()) {
                queued += 1;
            }
        }
        queued
    }

    /// Start parking frames for `conn` until [`release`](Self::release).
    pub fn hold(&mut self, conn: ConnectionId) {
        if let Some(outbox) = self.outboxes.get_mut(&conn) {
            outbox.held.get_or_insert_with(Vec::new);
        }
    }

    /// Deliver `first` (if any), then everything parked since
    /// [`hold`](Self::hold), and resume direct delivery.
    ///
    /// Returns the number of parked frames flushed.
    pub fn release(&mut self, conn: ConnectionId, first: Option<Frame>) -> usize {
        let Some(outbox) = self.outboxes.get_mut(&conn) else {
            return 0;
        };
        let parked = outbox.held.take().unwrap_or_default();
        let flushed = parked.len();
        if let Some(frame) = first {
            Self::deliver(&self.stats, outbox, frame);
        }
        for frame in parked {
            Self::deliver(&self.stats, outbox, frame);
        }
        flushed
    }

    pub fn is_held(&self, conn: ConnectionId) -> bool {
        self.outboxes
            .get(&conn)
            .is_some_and(|outbox| outbox.held.is_some())
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            frames_sent: self.stats.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
            connections: self.outboxes.len(),
        }
    }

    fn deliver(stats: &AtomicHubStats, outbox: &Outbox, frame: Frame) -> bool {
        if outbox.tx.send(frame).is_ok() {
            stats.frames_sent.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }
}
