//! # pairpad-collab — document sync and presence relay
//!
//! Keeps every client of a room on the same replicated document and the
//! same presence table.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   binary frames   ┌──────────────────┐
//! │ Connection  │ ◄───────────────► │   DocumentHub    │
//! │ (gateway)   │   Sync / Presence │  (one per server)│
//! └─────────────┘                   └────────┬─────────┘
//!                                            │ per room
//!                              ┌─────────────┼──────────────┐
//!                              ▼             ▼              ▼
//!                        DocumentEngine  PresenceTable  BroadcastGroup
//!                        (Yrs Doc)       (awareness)    (outboxes)
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — varint framing of Sync and Presence messages
//! - [`presence`] — typed presence records and the merge rule
//! - [`engine`] — CRDT capability trait and the Yrs implementation
//! - [`broadcast`] — per-room fan-out over connection outboxes
//! - [`hub`] — room lifecycle, routing and presence retraction

pub mod protocol;
pub mod presence;
pub mod engine;
pub mod broadcast;
pub mod hub;

// Re-exports for convenience
pub use protocol::{Frame, MessageType, ProtocolError, SyncMessage};
pub use presence::{
    EditorCursor, PointerPosition, PresenceDiff, PresenceEntry, PresenceId, PresenceState,
    PresenceTable, PresenceUpdate, ScrollPosition, UserInfo,
};
pub use engine::{DocumentEngine, EngineError, PresenceChanges, YrsEngine};
pub use broadcast::{outbox, BroadcastGroup, BroadcastStats, Outbox, Payload};
pub use hub::{DocumentHub, HubConfig, HubError, HubStats};
