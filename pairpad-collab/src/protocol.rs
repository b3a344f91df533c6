//! Binary framing for the document sync channel.
//!
//! Wire format (lib0 varint encoding, y-protocols compatible):
//! ```text
//! ┌──────────────┬────────────────────────────────────────────┐
//! │ msg_type     │ body                                       │
//! │ varuint      │                                            │
//! ├──────────────┼────────────────────────────────────────────┤
//! │ 0 = Sync     │ sync_type varuint │ payload varbuf          │
//! │ 1 = Presence │ update varbuf                              │
//! └──────────────┴────────────────────────────────────────────┘
//! ```
//!
//! Sync sub-types: `0 = Step1` (state vector), `1 = Step2` (diff),
//! `2 = Update` (incremental update). Payloads are opaque to this module.

use std::fmt;
use yrs::encoding::read::{Cursor, Read};
use yrs::encoding::write::Write;

/// Top-level message types for the sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Document sync (state vector / diff / update)
    Sync = 0,
    /// Presence (awareness) update
    Presence = 1,
}

impl MessageType {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Sync),
            1 => Some(Self::Presence),
            _ => None,
        }
    }
}

const SYNC_STEP1: u32 = 0;
const SYNC_STEP2: u32 = 1;
const SYNC_UPDATE: u32 = 2;

/// Document sync sub-message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// Sender's state vector; the receiver answers with everything missing.
    Step1(Vec<u8>),
    /// Diff answering a `Step1`.
    Step2(Vec<u8>),
    /// Incremental update produced by a local edit.
    Update(Vec<u8>),
}

impl SyncMessage {
    fn tag(&self) -> u32 {
        match self {
            Self::Step1(_) => SYNC_STEP1,
            Self::Step2(_) => SYNC_STEP2,
            Self::Update(_) => SYNC_UPDATE,
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            Self::Step1(p) | Self::Step2(p) | Self::Update(p) => p,
        }
    }
}

/// One decoded frame of the sync channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Sync(SyncMessage),
    Presence(Vec<u8>),
}

impl Frame {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Sync(_) => MessageType::Sync,
            Self::Presence(_) => MessageType::Presence,
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_var(self.message_type() as u32);
        match self {
            Self::Sync(msg) => {
                buf.write_var(msg.tag());
                buf.write_buf(msg.payload());
            }
            Self::Presence(update) => buf.write_buf(update),
        }
        buf
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut cursor = Cursor::new(bytes);
        let tag: u32 = cursor.read_var()?;
        match MessageType::from_tag(tag) {
            Some(MessageType::Sync) => {
                let sync_type: u32 = cursor.read_var()?;
                let payload = cursor.read_buf()?.to_vec();
                let msg = match sync_type {
                    SYNC_STEP1 => SyncMessage::Step1(payload),
                    SYNC_STEP2 => SyncMessage::Step2(payload),
                    SYNC_UPDATE => SyncMessage::Update(payload),
                    other => return Err(ProtocolError::UnknownSyncType(other)),
                };
                Ok(Self::Sync(msg))
            }
            Some(MessageType::Presence) => Ok(Self::Presence(cursor.read_buf()?.to_vec())),
            None => Err(ProtocolError::UnknownMessageType(tag)),
        }
    }

    pub fn sync_step1(state_vector: Vec<u8>) -> Self {
        Self::Sync(SyncMessage::Step1(state_vector))
    }

    pub fn sync_step2(diff: Vec<u8>) -> Self {
        Self::Sync(SyncMessage::Step2(diff))
    }

    pub fn sync_update(update: Vec<u8>) -> Self {
        Self::Sync(SyncMessage::Update(update))
    }

    pub fn presence(update: Vec<u8>) -> Self {
        Self::Presence(update)
    }
}

/// Protocol errors. All of them are non-fatal to the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Frame ended early or contained an invalid varint
    Malformed(String),
    UnknownMessageType(u32),
    UnknownSyncType(u32),
    /// Presence update entry was not valid JSON
    InvalidPresence(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "Malformed frame: {e}"),
            Self::UnknownMessageType(t) => write!(f, "Unknown message type: {t}"),
            Self::UnknownSyncType(t) => write!(f, "Unknown sync message type: {t}"),
            Self::InvalidPresence(e) => write!(f, "Invalid presence state: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<yrs::encoding::read::Error> for ProtocolError {
    fn from(e: yrs::encoding::read::Error) -> Self {
        ProtocolError::Malformed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_step1_layout() {
        let frame = Frame::sync_step1(vec![7, 8]);
        // type 0, sync step 0, len 2, payload
        assert_eq!(frame.encode(), vec![0, 0, 2, 7, 8]);
    }

    #[test]
    fn test_presence_layout() {
        let frame = Frame::presence(vec![1, 2, 3]);
        assert_eq!(frame.encode(), vec![1, 3, 1, 2, 3]);
    }

    #[test]
    fn test_decode_each_sync_type() {
        assert_eq!(
            Frame::decode(&[0, 1, 1, 9]).unwrap(),
            Frame::Sync(SyncMessage::Step2(vec![9]))
        );
        assert_eq!(
            Frame::decode(&[0, 2, 0]).unwrap(),
            Frame::Sync(SyncMessage::Update(Vec::new()))
        );
    }

    #[test]
    fn test_large_update_roundtrip() {
        // 64KB payload needs a multi-byte length prefix
        let payload = vec![42u8; 65536];
        let frame = Frame::sync_update(payload.clone());
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, Frame::Sync(SyncMessage::Update(payload)));
    }

    #[test]
    fn test_unknown_message_type() {
        assert_eq!(
            Frame::decode(&[5, 0]).unwrap_err(),
            ProtocolError::UnknownMessageType(5)
        );
    }

    #[test]
    fn test_unknown_sync_type() {
        assert_eq!(
            Frame::decode(&[0, 9, 0]).unwrap_err(),
            ProtocolError::UnknownSyncType(9)
        );
    }

    #[test]
    fn test_truncated_frames() {
        assert!(Frame::decode(&[]).is_err());
        assert!(Frame::decode(&[0]).is_err());
        // declares 4 payload bytes, carries 1
        assert!(matches!(
            Frame::decode(&[1, 4, 0]),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_message_type_values() {
        assert_eq!(MessageType::Sync as u8, 0);
        assert_eq!(MessageType::Presence as u8, 1);
        assert_eq!(MessageType::from_tag(2), None);
    }
}
