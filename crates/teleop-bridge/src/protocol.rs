//! rosbridge JSON envelope.
//!
//! Outbound requests are typed [`OutboundFrame`] values; serialising one
//! yields exactly one JSON text frame with `op` as its first key:
//!
//! ```text
//! {"op":"subscribe","id":"…","topic":"…","type":"…","throttle_rate":200}
//! {"op":"unsubscribe","id":"…","topic":"…"}
//! {"op":"publish","id":"…","topic":"…","msg":{…},"type":"…"}
//! ```
//!
//! Inbound frames are decoded into [`InboundFrame`]; any `op` other than
//! `publish` or `status` is kept as [`InboundFrame::Other`] and ignored by
//! the session.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use teleop_types::SessionError;

/// A request sent from the client to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OutboundFrame {
    Subscribe {
        id: String,
        topic: String,
        #[serde(rename = "type")]
        msg_type: String,
        throttle_rate: u32,
    },
    Unsubscribe {
        id: String,
        topic: String,
    },
    Publish {
        id: String,
        topic: String,
        msg: Value,
        #[serde(rename = "type")]
        msg_type: String,
    },
}

impl OutboundFrame {
    /// The bus operation name, used as the id prefix.
    pub fn op(&self) -> &'static str {
        match self {
            OutboundFrame::Subscribe { .. } => "subscribe",
            OutboundFrame::Unsubscribe { .. } => "unsubscribe",
            OutboundFrame::Publish { .. } => "publish",
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            OutboundFrame::Subscribe { topic, .. }
            | OutboundFrame::Unsubscribe { topic, .. }
            | OutboundFrame::Publish { topic, .. } => topic,
        }
    }

    /// Serialise into a single JSON text frame.
    pub fn encode(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Decode(e.to_string()))
    }
}

/// A message received from the bridge.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InboundFrame {
    Publish {
        topic: String,
        #[serde(default)]
        msg: Value,
    },
    Status {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        level: Option<String>,
        #[serde(default)]
        msg: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl InboundFrame {
    /// Parse raw frame bytes.
    pub fn decode(raw: &[u8]) -> Result<Self, SessionError> {
        serde_json::from_slice(raw).map_err(|e| SessionError::Decode(format!("bad frame: {e}")))
    }
}
