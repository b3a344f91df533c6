//! Which rooms a server will host.

use std::collections::HashSet;

use pairpad_core::{RoomKey, ValidationError};

/// Consulted before a connection joins a room on either channel.
pub trait RoomRegistry: Send + Sync + 'static {
    fn admits(&self, room: &RoomKey) -> bool;
}

/// Admits every well-formed room key.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenRegistry;

impl RoomRegistry for OpenRegistry {
    fn admits(&self, _room: &RoomKey) -> bool {
        true
    }
}

/// Admits a fixed set of rooms.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    rooms: HashSet<RoomKey>,
}

impl StaticRegistry {
    pub fn new(rooms: impl IntoIterator<Item = RoomKey>) -> Self {
        Self {
            rooms: rooms.into_iter().collect(),
        }
    }

    /// Parse every key, failing on the first malformed one.
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Result<Self, ValidationError> {
        let rooms = keys
            .iter()
            .map(|k| RoomKey::parse(k.as_ref()))
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(Self { rooms })
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl RoomRegistry for StaticRegistry {
    fn admits(&self, room: &RoomKey) -> bool {
        self.rooms.contains(room)
    }
}
