//! Execution channel messages.
//!
//! Both directions are JSON objects tagged by `type`:
//!
//! ```text
//! client → server   join · leave · run · resize
//! server → client   data · exit · error
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Terminal dimensions reported by the client. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    #[serde(default)]
    pub cols: u16,
    #[serde(default)]
    pub rows: u16,
}

/// Client → server request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExecRequest {
    Join {
        #[serde(rename = "roomKey")]
        room_key: String,
        #[serde(flatten)]
        size: TerminalSize,
    },
    Leave {
        #[serde(rename = "roomKey")]
        room_key: String,
    },
    Run {
        #[serde(rename = "roomKey")]
        room_key: String,
        language: String,
        code: String,
    },
    Resize {
        #[serde(rename = "roomKey")]
        room_key: String,
        #[serde(flatten)]
        size: TerminalSize,
    },
}

impl ExecRequest {
    pub fn room_key(&self) -> &str {
        match self {
            Self::Join { room_key, .. }
            | Self::Leave { room_key }
            | Self::Run { room_key, .. }
            | Self::Resize { room_key, .. } => room_key,
        }
    }
}

/// Server → client event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExecEvent {
    Data {
        data: String,
    },
    Exit {
        #[serde(rename = "exitCode")]
        exit_code: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<String>,
    },
    Error {
        error: String,
    },
}

impl ExecEvent {
    pub fn data(text: impl Into<String>) -> Self {
        Self::Data { data: text.into() }
    }

    pub fn error(message: impl ToString) -> Self {
        Self::Error {
            error: message.to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Where a connection receives execution events.
pub type Viewer = mpsc::UnboundedSender<ExecEvent>;
