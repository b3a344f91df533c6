//! Replicated document engine seam.
//!
//! The hub never merges anything itself: it hands sync payloads and
//! presence updates to a [`DocumentEngine`] and only routes the results.
//! [`YrsEngine`] is the shipped implementation, backed by a Yrs `Doc`.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Instant;

use pairpad_core::ConnectionId;
use yrs::updates::decoder::Decode;
use yrs::{ReadTxn, StateVector, Transact, Update};

use crate::presence::{PresenceDiff, PresenceId, PresenceTable, PresenceUpdate};
use crate::protocol::ProtocolError;

/// Errors raised while applying a payload to a document or presence table.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Payload could not be decoded
    Decode(String),
    /// Payload decoded but could not be integrated
    Apply(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "Decode error: {e}"),
            Self::Apply(e) => write!(f, "Apply error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<yrs::encoding::read::Error> for EngineError {
    fn from(e: yrs::encoding::read::Error) -> Self {
        EngineError::Decode(e.to_string())
    }
}

impl From<ProtocolError> for EngineError {
    fn from(e: ProtocolError) -> Self {
        EngineError::Decode(e.to_string())
    }
}

/// Result of a presence merge: what changed, and which connection caused it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceChanges {
    pub diff: PresenceDiff,
    pub by_origin: HashMap<ConnectionId, BTreeSet<PresenceId>>,
}

impl PresenceChanges {
    pub fn is_empty(&self) -> bool {
        self.diff.is_empty()
    }

    pub fn changed(&self) -> Vec<PresenceId> {
        self.diff.changed()
    }
}

/// CRDT capability consumed by the document hub.
pub trait DocumentEngine: Send + Sync + 'static {
    /// Opaque per-room document handle.
    type Document: Send + 'static;

    fn empty_document(&self) -> Self::Document;

    /// Encoded state vector of `doc`, used to request the peer's full state.
    fn state_vector(&self, doc: &Self::Document) -> Vec<u8>;

    /// Everything in `doc` the holder of `state_vector` has not seen.
    fn diff_since(&self, doc: &Self::Document, state_vector: &[u8]) -> Result<Vec<u8>, EngineError>;

    /// Integrate `update`. Returns the resulting mutation when the document
    /// actually changed, `None` when the update was already known.
    fn apply_update(
        &self,
        doc: &mut Self::Document,
        update: &[u8],
    ) -> Result<Option<Vec<u8>>, EngineError>;

    /// Merge an encoded presence update sent by `origin`.
    fn merge_presence(
        &self,
        table: &mut PresenceTable,
        update: &[u8],
        origin: ConnectionId,
    ) -> Result<PresenceChanges, EngineError>;
}

/// Update v1 encoding of "nothing": zero structs, empty delete set.
const EMPTY_UPDATE_V1: &[u8] = &[0, 0];

/// [`DocumentEngine`] backed by Yrs.
#[derive(Debug, Clone, Copy, Default)]
pub struct YrsEngine;

impl YrsEngine {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentEngine for YrsEngine {
    type Document = yrs::Doc;

    fn empty_document(&self) -> yrs::Doc {
        yrs::Doc::new()
    }

    fn state_vector(&self, doc: &yrs::Doc) -> Vec<u8> {
        use yrs::updates::encoder::Encode;
        let txn = doc.transact();
        txn.state_vector().encode_v1()
    }

    fn diff_since(&self, doc: &yrs::Doc, state_vector: &[u8]) -> Result<Vec<u8>, EngineError> {
        let remote_sv = StateVector::decode_v1(state_vector)?;
        let txn = doc.transact();
        Ok(txn.encode_diff_v1(&remote_sv))
    }

    fn apply_update(&self, doc: &mut yrs::Doc, update: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        let update = Update::decode_v1(update)?;
        let mut txn = doc.transact_mut();
        txn.apply_update(update)
            .map_err(|e| EngineError::Apply(e.to_string()))?;

        // Only what this transaction integrated; pending structs excluded
        let mutation = txn.encode_update_v1();
        if mutation.as_slice() == EMPTY_UPDATE_V1 {
            Ok(None)
        } else {
            Ok(Some(mutation))
        }
    }

    fn merge_presence(
        &self,
        table: &mut PresenceTable,
        update: &[u8],
        origin: ConnectionId,
    ) -> Result<PresenceChanges, EngineError> {
        let update = PresenceUpdate::decode(update)?;
        let diff = table.apply(update, Instant::now());

        let mut by_origin = HashMap::new();
        if !diff.is_empty() {
            by_origin.insert(origin, diff.changed().into_iter().collect());
        }
        Ok(PresenceChanges { diff, by_origin })
    }
}
