//! Per-room fan-out to connected peers.
//!
//! Every connection owns an unbounded FIFO outbox drained by its transport
//! writer, so one slow socket never blocks the room. A send to a closed
//! outbox is counted and skipped; the rest of the fan-out continues.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use pairpad_core::ConnectionId;

/// Encoded frame shared between all recipients of one broadcast.
pub type Payload = Arc<Vec<u8>>;

/// Sending half of a connection's outbox.
pub type Outbox = mpsc::UnboundedSender<Payload>;

/// Create an outbox pair for a new connection.
pub fn outbox() -> (Outbox, mpsc::UnboundedReceiver<Payload>) {
    mpsc::unbounded_channel()
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_peers: usize,
}

/// Atomic broadcast stats, bumped without taking the room lock.
#[derive(Debug, Default)]
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

/// Fan-out group for a single room.
#[derive(Debug, Default)]
pub struct BroadcastGroup {
    peers: HashMap<ConnectionId, Outbox>,
    stats: Arc<AtomicBroadcastStats>,
}

impl BroadcastGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_peer(&mut self, id: ConnectionId, outbox: Outbox) {
        self.peers.insert(id, outbox);
    }

    pub fn remove_peer(&mut self, id: &ConnectionId) -> Option<Outbox> {
        self.peers.remove(id)
    }

    /// Send to a single peer. Returns `false` when the peer is unknown or
    /// its transport has gone away.
    pub fn send_to(&self, id: &ConnectionId, payload: Payload) -> bool {
        match self.peers.get(id) {
            Some(outbox) => self.deliver(id, outbox, payload),
            None => false,
        }
    }

    /// Send to every peer except `except`. Returns the number of peers the
    /// frame was handed to.
    pub fn broadcast(&self, payload: Payload, except: Option<&ConnectionId>) -> usize {
        let mut delivered = 0;
        for (id, outbox) in &self.peers {
            if Some(id) == except {
                continue;
            }
            if self.deliver(id, outbox, payload.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    fn deliver(&self, id: &ConnectionId, outbox: &Outbox, payload: Payload) -> bool {
        match outbox.send(payload) {
            Ok(()) => {
                self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("Skipping closed outbox for connection {id}");
                false
            }
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn has_peer(&self, id: &ConnectionId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn peer_ids(&self) -> Vec<ConnectionId> {
        self.peers.keys().copied().collect()
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            active_peers: self.peers.len(),
        }
    }
}
