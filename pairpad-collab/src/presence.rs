//! Presence (awareness) table for one document room.
//!
//! Provides the room-wide "who is where" state (user profile, mouse
//! cursor, scroll position, editor caret) keyed by the ephemeral numeric
//! id each client picks for itself.
//!
//! ## Update encoding
//!
//! ```text
//! varuint count
//! repeat count:
//!     varuint id │ varuint clock │ varstring json   ("null" = removed)
//! ```
//!
//! ## Merge rule
//!
//! An entry is accepted when its clock is newer than the stored one, or when
//! it has the same clock and removes a state that is still present. Removed
//! ids keep their clock so later encodes carry `null` at the right clock.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use yrs::encoding::read::{Cursor, Read};
use yrs::encoding::write::Write;

use crate::protocol::ProtocolError;

/// Ephemeral presence identity (the client's document client id).
pub type PresenceId = u64;

// ───────────────────────────────────────────────────────────────────
// Presence records
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    pub color: String,
}

/// Mouse position in editor pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub top: f64,
    pub left: f64,
    pub ts: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EditorCursor {
    pub line: u32,
    pub column: u32,
    pub ts: u64,
}

/// One client's presence state.
///
/// Every known field is optional. Anything else a newer client sends is kept
/// in `extra` and written back out untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<PointerPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll: Option<ScrollPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_cursor: Option<EditorCursor>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PresenceState {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(|e| ProtocolError::InvalidPresence(e.to_string()))
    }
}

// ───────────────────────────────────────────────────────────────────
// Wire updates
// ───────────────────────────────────────────────────────────────────

/// A single entry of a presence update. `state: None` means removal.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceEntry {
    pub id: PresenceId,
    pub clock: u32,
    pub state: Option<PresenceState>,
}

/// Decoded presence update payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceUpdate {
    pub entries: Vec<PresenceEntry>,
}

impl PresenceUpdate {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut cursor = Cursor::new(bytes);
        let count: u32 = cursor.read_var()?;
        let mut entries = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let id: u64 = cursor.read_var()?;
            let clock: u32 = cursor.read_var()?;
            let json = cursor.read_string()?;
            let state = if json == "null" {
                None
            } else {
                Some(PresenceState::from_json(json)?)
            };
            entries.push(PresenceEntry { id, clock, state });
        }
        Ok(Self { entries })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_var(self.entries.len() as u32);
        for entry in &self.entries {
            buf.write_var(entry.id);
            buf.write_var(entry.clock);
            match &entry.state {
                Some(state) => buf.write_string(&state.to_json()),
                None => buf.write_string("null"),
            }
        }
        buf
    }

    pub fn ids(&self) -> impl Iterator<Item = PresenceId> + '_ {
        self.entries.iter().map(|e| e.id)
    }
}

// ───────────────────────────────────────────────────────────────────
// Presence table
// ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct PresenceMeta {
    clock: u32,
    last_updated: Instant,
}

/// Ids touched by one merge, split by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceDiff {
    pub added: Vec<PresenceId>,
    pub updated: Vec<PresenceId>,
    pub removed: Vec<PresenceId>,
}

impl PresenceDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// All changed ids: added, then updated, then removed.
    pub fn changed(&self) -> Vec<PresenceId> {
        self.added
            .iter()
            .chain(&self.updated)
            .chain(&self.removed)
            .copied()
            .collect()
    }
}

/// Room-wide presence states plus per-id clocks.
#[derive(Debug, Default)]
pub struct PresenceTable {
    states: HashMap<PresenceId, PresenceState>,
    meta: HashMap<PresenceId, PresenceMeta>,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a decoded update. Returns which ids changed.
    pub fn apply(&mut self, update: PresenceUpdate, now: Instant) -> PresenceDiff {
        let mut diff = PresenceDiff::default();

        for PresenceEntry { id, clock, state } in update.entries {
            let current_clock = self.meta.get(&id).map_or(0, |m| m.clock);
            let present = self.states.contains_key(&id);
            let known = self.meta.contains_key(&id);

            let accept = !known
                || clock > current_clock
                || (clock == current_clock && state.is_none() && present);
            if !accept {
                continue;
            }

            self.meta.insert(id, PresenceMeta { clock, last_updated: now });
            match state {
                None => {
                    if self.states.remove(&id).is_some() {
                        diff.removed.push(id);
                    }
                }
                Some(state) => {
                    if self.states.insert(id, state).is_some() {
                        diff.updated.push(id);
                    } else {
                        diff.added.push(id);
                    }
                }
            }
        }

        diff
    }

    /// Remove the given ids, bumping their clocks. Returns the ids that were
    /// actually present.
    pub fn remove<I>(&mut self, ids: I, now: Instant) -> Vec<PresenceId>
    where
        I: IntoIterator<Item = PresenceId>,
    {
        let mut removed = Vec::new();
        for id in ids {
            if self.states.remove(&id).is_none() {
                continue;
            }
            let meta = self.meta.entry(id).or_insert(PresenceMeta {
                clock: 0,
                last_updated: now,
            });
            meta.clock = meta.clock.saturating_add(1);
            meta.last_updated = now;
            removed.push(id);
        }
        removed
    }

    /// Remove states that have not been refreshed within `timeout`.
    pub fn prune_outdated(&mut self, now: Instant, timeout: Duration) -> Vec<PresenceId> {
        let stale: Vec<PresenceId> = self
            .states
            .keys()
            .filter(|id| {
                self.meta
                    .get(id)
                    .is_some_and(|m| now.saturating_duration_since(m.last_updated) >= timeout)
            })
            .copied()
            .collect();
        self.remove(stale, now)
    }

    /// Encode the current view of `ids` (unknown ids are skipped).
    pub fn encode_update<I>(&self, ids: I) -> Vec<u8>
    where
        I: IntoIterator<Item = PresenceId>,
    {
        let entries = ids
            .into_iter()
            .filter_map(|id| {
                self.meta.get(&id).map(|meta| PresenceEntry {
                    id,
                    clock: meta.clock,
                    state: self.states.get(&id).cloned(),
                })
            })
            .collect();
        PresenceUpdate { entries }.encode()
    }

    /// Encode every live state, for a newly joined connection.
    pub fn snapshot(&self) -> Vec<u8> {
        let mut ids: Vec<PresenceId> = self.states.keys().copied().collect();
        ids.sort_unstable();
        self.encode_update(ids)
    }

    pub fn get(&self, id: PresenceId) -> Option<&PresenceState> {
        self.states.get(&id)
    }

    pub fn clock(&self, id: PresenceId) -> Option<u32> {
        self.meta.get(&id).map(|m| m.clock)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.meta.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> PresenceState {
        PresenceState {
            user: Some(UserInfo {
                name: name.into(),
                color: "#ff0000".into(),
            }),
            ..PresenceState::default()
        }
    }

    fn update(entries: Vec<(PresenceId, u32, Option<PresenceState>)>) -> PresenceUpdate {
        PresenceUpdate {
            entries: entries
                .into_iter()
                .map(|(id, clock, state)| PresenceEntry { id, clock, state })
                .collect(),
        }
    }

    #[test]
    fn test_state_json_shape() {
        let state = PresenceState {
            editor_cursor: Some(EditorCursor { line: 3, column: 7, ts: 10 }),
            ..user("Alice")
        };
        let value: Value = serde_json::from_str(&state.to_json()).unwrap();
        assert_eq!(value["user"]["name"], "Alice");
        assert_eq!(value["editorCursor"]["line"], 3);
        assert!(value.get("cursor").is_none());
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let json = r##"{"user":{"name":"Bob","color":"#00f"},"selection":{"from":1,"to":4},"mood":"happy"}"##;
        let state = PresenceState::from_json(json).unwrap();
        assert_eq!(state.user.as_ref().unwrap().name, "Bob");
        assert_eq!(state.extra["mood"], "happy");

        let back: Value = serde_json::from_str(&state.to_json()).unwrap();
        let original: Value = serde_json::from_str(json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_invalid_known_field_is_rejected() {
        let err = PresenceState::from_json(r#"{"cursor":"left"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPresence(_)));
    }

    #[test]
    fn test_update_wire_roundtrip() {
        let original = update(vec![(1, 3, Some(user("Alice"))), (2, 9, None)]);
        let decoded = PresenceUpdate::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_truncated_update() {
        let bytes = update(vec![(1, 1, Some(user("Alice")))]).encode();
        assert!(PresenceUpdate::decode(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn test_apply_add_update_remove() {
        let mut table = PresenceTable::new();
        let now = Instant::now();

        let diff = table.apply(update(vec![(7, 0, Some(user("Alice")))]), now);
        assert_eq!(diff.added, vec![7]);
        assert_eq!(table.len(), 1);

        let diff = table.apply(update(vec![(7, 1, Some(user("Alicia")))]), now);
        assert_eq!(diff.updated, vec![7]);
        assert_eq!(table.get(7).unwrap().user.as_ref().unwrap().name, "Alicia");

        let diff = table.apply(update(vec![(7, 2, None)]), now);
        assert_eq!(diff.removed, vec![7]);
        assert!(table.is_empty());
        assert_eq!(table.clock(7), Some(2));
    }

    #[test]
    fn test_stale_clock_ignored() {
        let mut table = PresenceTable::new();
        let now = Instant::now();
        table.apply(update(vec![(1, 5, Some(user("new")))]), now);

        let diff = table.apply(update(vec![(1, 4, Some(user("old")))]), now);
        assert!(diff.is_empty());
        assert_eq!(table.get(1).unwrap().user.as_ref().unwrap().name, "new");

        // Same clock with a state is a duplicate
        let diff = table.apply(update(vec![(1, 5, Some(user("dup")))]), now);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_same_clock_removal_accepted() {
        let mut table = PresenceTable::new();
        let now = Instant::now();
        table.apply(update(vec![(1, 5, Some(user("Alice")))]), now);

        let diff = table.apply(update(vec![(1, 5, None)]), now);
        assert_eq!(diff.removed, vec![1]);
    }

    #[test]
    fn test_remove_bumps_clock_and_encodes_null() {
        let mut table = PresenceTable::new();
        let now = Instant::now();
        table.apply(update(vec![(3, 4, Some(user("Alice")))]), now);

        let removed = table.remove([3, 99], now);
        assert_eq!(removed, vec![3]);
        assert_eq!(table.clock(3), Some(5));

        let decoded = PresenceUpdate::decode(&table.encode_update(removed)).unwrap();
        assert_eq!(decoded, update(vec![(3, 5, None)]));
    }

    #[test]
    fn test_remove_at_max_clock_saturates() {
        let mut table = PresenceTable::new();
        let now = Instant::now();
        table.apply(update(vec![(1, u32::MAX, Some(user("Alice")))]), now);

        assert_eq!(table.remove([1], now), vec![1]);
        assert_eq!(table.clock(1), Some(u32::MAX));
        assert!(table.is_empty());
    }

    #[test]
    fn test_removed_entry_can_be_renewed() {
        let mut table = PresenceTable::new();
        let now = Instant::now();
        table.apply(update(vec![(3, 0, Some(user("Alice")))]), now);
        table.remove([3], now);

        let diff = table.apply(update(vec![(3, 2, Some(user("Alice")))]), now);
        assert_eq!(diff.added, vec![3]);
    }

    #[test]
    fn test_prune_outdated() {
        let mut table = PresenceTable::new();
        let start = Instant::now();
        table.apply(update(vec![(1, 0, Some(user("idle")))]), start);
        table.apply(
            update(vec![(2, 0, Some(user("active")))]),
            start + Duration::from_secs(20),
        );

        let pruned = table.prune_outdated(start + Duration::from_secs(31), Duration::from_secs(30));
        assert_eq!(pruned, vec![1]);
        assert_eq!(table.len(), 1);
        assert!(table.get(2).is_some());
    }

    #[test]
    fn test_snapshot_contains_live_states_only() {
        let mut table = PresenceTable::new();
        let now = Instant::now();
        table.apply(
            update(vec![(1, 0, Some(user("A"))), (2, 0, Some(user("B")))]),
            now,
        );
        table.remove([2], now);

        let snapshot = PresenceUpdate::decode(&table.snapshot()).unwrap();
        assert_eq!(snapshot.ids().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_diff_changed_order() {
        let diff = PresenceDiff {
            added: vec![1],
            updated: vec![2],
            removed: vec![3],
        };
        assert_eq!(diff.changed(), vec![1, 2, 3]);
    }
}
