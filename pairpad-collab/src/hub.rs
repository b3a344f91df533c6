//! Document synchronization hub.
//!
//! ```text
//! Connection A ──┐                         ┌──► Outbox A
//!                ├── DocumentSession(room) ┤
//! Connection B ──┘    │  document (engine) └──► Outbox B
//!                     │  presence table
//!                     └  broadcast group
//! ```
//!
//! A room's session is created by the first `join` and dropped, together
//! with its document handle and presence table, when the last connection
//! leaves. Each connection remembers the presence ids it has introduced or
//! updated so they can be retracted when it goes away.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use pairpad_core::{ConnectionId, RoomKey, ValidationError};

use crate::broadcast::{BroadcastGroup, BroadcastStats, Outbox};
use crate::engine::{DocumentEngine, EngineError};
use crate::presence::{PresenceId, PresenceTable};
use crate::protocol::{Frame, ProtocolError, SyncMessage};

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Presence states not refreshed within this window are swept
    pub presence_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            presence_timeout: Duration::from_secs(30),
        }
    }
}

/// Hub-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub dropped_frames: u64,
    pub active_rooms: usize,
}

/// Why a frame was not applied. None of these close the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum HubError {
    NotJoined(ConnectionId),
    Protocol(ProtocolError),
    Engine(EngineError),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotJoined(id) => write!(f, "Connection {id} has not joined a room"),
            Self::Protocol(e) => write!(f, "{e}"),
            Self::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for HubError {}

impl From<ProtocolError> for HubError {
    fn from(e: ProtocolError) -> Self {
        HubError::Protocol(e)
    }
}

impl From<EngineError> for HubError {
    fn from(e: EngineError) -> Self {
        HubError::Engine(e)
    }
}

/// Per-room document state.
struct DocumentSession<D> {
    doc: D,
    presence: PresenceTable,
    peers: BroadcastGroup,
}

/// Per-connection bookkeeping.
struct Connection {
    room: RoomKey,
    controlled: BTreeSet<PresenceId>,
}

struct HubState<D> {
    rooms: HashMap<RoomKey, DocumentSession<D>>,
    connections: HashMap<ConnectionId, Connection>,
    stats: HubStats,
}

/// Owns every room's document session. Share it behind an `Arc`.
pub struct DocumentHub<E: DocumentEngine> {
    engine: E,
    config: HubConfig,
    state: Mutex<HubState<E::Document>>,
}

impl<E: DocumentEngine> DocumentHub<E> {
    pub fn new(engine: E, config: HubConfig) -> Self {
        Self {
            engine,
            config,
            state: Mutex::new(HubState {
                rooms: HashMap::new(),
                connections: HashMap::new(),
                stats: HubStats::default(),
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Attach `id` to the room named `room_key`, creating the session on
    /// first join. The connection is asked for its full state and, if the
    /// room has presence, receives a snapshot of it.
    pub async fn join(
        &self,
        id: ConnectionId,
        room_key: &str,
        outbox: Outbox,
    ) -> Result<(), ValidationError> {
        let room = RoomKey::parse(room_key)?;

        if self.state.lock().await.connections.contains_key(&id) {
            log::warn!("Connection {id} joined twice; leaving previous room first");
            self.leave(id).await;
        }

        let mut state = self.state.lock().await;
        let state = &mut *state;

        let is_new_room = !state.rooms.contains_key(&room);
        let session = state
            .rooms
            .entry(room.clone())
            .or_insert_with(|| DocumentSession {
                doc: self.engine.empty_document(),
                presence: PresenceTable::new(),
                peers: BroadcastGroup::new(),
            });
        if is_new_room {
            log::info!("Room {room} opened");
        }

        session.peers.add_peer(id, outbox);

        let request = Frame::sync_step1(self.engine.state_vector(&session.doc));
        session.peers.send_to(&id, Arc::new(request.encode()));

        if !session.presence.is_empty() {
            let snapshot = Frame::presence(session.presence.snapshot());
            session.peers.send_to(&id, Arc::new(snapshot.encode()));
        }

        state.connections.insert(
            id,
            Connection {
                room: room.clone(),
                controlled: BTreeSet::new(),
            },
        );
        state.stats.total_connections += 1;
        state.stats.active_connections += 1;

        log::info!(
            "Connection {id} joined room {room} ({} peers)",
            session.peers.peer_count()
        );
        Ok(())
    }

    /// Apply one binary frame from `id` and route the results.
    ///
    /// Errors are logged here; the caller only needs them for tests.
    pub async fn on_message(&self, id: ConnectionId, bytes: &[u8]) -> Result<(), HubError> {
        let mut state = self.state.lock().await;
        state.stats.total_messages += 1;
        state.stats.total_bytes += bytes.len() as u64;

        let result = self.apply_frame(&mut state, id, bytes);
        if let Err(ref e) = result {
            state.stats.dropped_frames += 1;
            log::warn!("Dropped frame from connection {id}: {e}");
        }
        result
    }

    fn apply_frame(
        &self,
        state: &mut HubState<E::Document>,
        id: ConnectionId,
        bytes: &[u8],
    ) -> Result<(), HubError> {
        let room = match state.connections.get(&id) {
            Some(conn) => conn.room.clone(),
            None => return Err(HubError::NotJoined(id)),
        };
        let session = state
            .rooms
            .get_mut(&room)
            .ok_or(HubError::NotJoined(id))?;

        match Frame::decode(bytes)? {
            Frame::Sync(SyncMessage::Step1(state_vector)) => {
                let diff = self.engine.diff_since(&session.doc, &state_vector)?;
                session
                    .peers
                    .send_to(&id, Arc::new(Frame::sync_step2(diff).encode()));
            }
            Frame::Sync(SyncMessage::Step2(update)) | Frame::Sync(SyncMessage::Update(update)) => {
                if let Some(mutation) = self.engine.apply_update(&mut session.doc, &update)? {
                    let frame = Arc::new(Frame::sync_update(mutation).encode());
                    let delivered = session.peers.broadcast(frame, Some(&id));
                    log::debug!("Room {room}: update from {id} fanned out to {delivered} peers");
                }
            }
            Frame::Presence(update) => {
                let changes = self
                    .engine
                    .merge_presence(&mut session.presence, &update, id)?;
                if changes.is_empty() {
                    return Ok(());
                }

                for (origin, ids) in &changes.by_origin {
                    if let Some(conn) = state.connections.get_mut(origin) {
                        conn.controlled.extend(ids.iter().copied());
                    }
                }

                let encoded = session.presence.encode_update(changes.changed());
                session
                    .peers
                    .broadcast(Arc::new(Frame::presence(encoded).encode()), None);
                log::trace!(
                    "Room {room}: presence +{} ~{} -{}",
                    changes.diff.added.len(),
                    changes.diff.updated.len(),
                    changes.diff.removed.len()
                );
            }
        }

        Ok(())
    }

    /// Detach `id`. Presence it controlled is retracted and the room is
    /// closed when it was the last connection. Unknown ids are ignored.
    pub async fn leave(&self, id: ConnectionId) {
        let mut state = self.state.lock().await;
        let state = &mut *state;

        let Some(conn) = state.connections.remove(&id) else {
            return;
        };
        state.stats.active_connections = state.stats.active_connections.saturating_sub(1);

        let Some(session) = state.rooms.get_mut(&conn.room) else {
            return;
        };
        session.peers.remove_peer(&id);

        let removed = session.presence.remove(conn.controlled, Instant::now());
        if !removed.is_empty() {
            let encoded = session.presence.encode_update(removed.iter().copied());
            session
                .peers
                .broadcast(Arc::new(Frame::presence(encoded).encode()), None);
        }

        log::info!(
            "Connection {id} left room {} ({} presence states retracted)",
            conn.room,
            removed.len()
        );

        if session.peers.is_empty() {
            state.rooms.remove(&conn.room);
            log::info!("Room {} closed (empty)", conn.room);
        }
    }

    /// Sweep presence states older than the configured timeout in every
    /// room, broadcasting the removals. Returns how many were removed.
    pub async fn prune_outdated(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let mut total = 0;

        for (room, session) in state.rooms.iter_mut() {
            let removed = session
                .presence
                .prune_outdated(now, self.config.presence_timeout);
            if removed.is_empty() {
                continue;
            }
            total += removed.len();
            let encoded = session.presence.encode_update(removed.iter().copied());
            session
                .peers
                .broadcast(Arc::new(Frame::presence(encoded).encode()), None);
            log::debug!("Room {room}: swept {} outdated presence states", removed.len());
        }

        total
    }

    pub async fn stats(&self) -> HubStats {
        let state = self.state.lock().await;
        HubStats {
            active_rooms: state.rooms.len(),
            ..state.stats.clone()
        }
    }

    pub async fn room_count(&self) -> usize {
        self.state.lock().await.rooms.len()
    }

    pub async fn has_room(&self, room_key: &str) -> bool {
        match RoomKey::parse(room_key) {
            Ok(room) => self.state.lock().await.rooms.contains_key(&room),
            Err(_) => false,
        }
    }

    /// Number of connections in a room (0 when the room is closed).
    pub async fn peer_count(&self, room_key: &str) -> usize {
        let Ok(room) = RoomKey::parse(room_key) else {
            return 0;
        };
        self.state
            .lock()
            .await
            .rooms
            .get(&room)
            .map_or(0, |s| s.peers.peer_count())
    }

    pub async fn presence_count(&self, room_key: &str) -> usize {
        let Ok(room) = RoomKey::parse(room_key) else {
            return 0;
        };
        self.state
            .lock()
            .await
            .rooms
            .get(&room)
            .map_or(0, |s| s.presence.len())
    }

    /// Presence ids `id` is currently responsible for.
    pub async fn controlled_presence(&self, id: ConnectionId) -> Vec<PresenceId> {
        self.state
            .lock()
            .await
            .connections
            .get(&id)
            .map(|c| c.controlled.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn broadcast_stats(&self, room_key: &str) -> Option<BroadcastStats> {
        let room = RoomKey::parse(room_key).ok()?;
        self.state
            .lock()
            .await
            .rooms
            .get(&room)
            .map(|s| s.peers.stats())
    }
}
