//! Shared identifiers for the pairpad realtime backend.
//!
//! Both the document hub and the execution manager key their state by
//! [`RoomKey`] and address clients by [`ConnectionId`]. A `RoomKey` can only
//! be obtained through [`RoomKey::parse`], so holding one means the
//! `xxx-xxx-xxx` shape has already been checked.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Number of lowercase letters in each hyphen-separated group.
const GROUP_LEN: usize = 3;
/// Number of groups in a room key.
const GROUP_COUNT: usize = 3;
/// Total length: three groups plus two hyphens.
const KEY_LEN: usize = GROUP_LEN * GROUP_COUNT + (GROUP_COUNT - 1);

/// A validated collaboration room code, e.g. `abc-def-ghi`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomKey(String);

impl RoomKey {
    /// Validate `raw` against `^[a-z]{3}-[a-z]{3}-[a-z]{3}$`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.len() != KEY_LEN {
            return Err(ValidationError::InvalidRoomKey(raw.to_string()));
        }

        let well_formed = raw.bytes().enumerate().all(|(i, b)| {
            if i % (GROUP_LEN + 1) == GROUP_LEN {
                b == b'-'
            } else {
                b.is_ascii_lowercase()
            }
        });

        if well_formed {
            Ok(Self(raw.to_string()))
        } else {
            Err(ValidationError::InvalidRoomKey(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomKey> for String {
    fn from(key: RoomKey) -> Self {
        key.0
    }
}

impl AsRef<str> for RoomKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identity of one transport connection, shared by the sync and exec channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create with an explicit id (for testing)
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input rejected before any state is touched.
///
/// The `Display` text is what clients see in `error` events, so it stays short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    InvalidRoomKey(String),
    UnsupportedLanguage(String),
    EmptyCode,
    CodeTooLarge { len: usize, max: usize },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRoomKey(_) => write!(f, "Invalid room key"),
            Self::UnsupportedLanguage(_) => write!(f, "Unsupported language"),
            Self::EmptyCode => write!(f, "Code must not be empty"),
            Self::CodeTooLarge { .. } => write!(f, "Code too large"),
        }
    }
}

impl std::error::Error for ValidationError {}
