//! Signaling wire format
//!
//! Every frame is a JSON object carrying `type`, `roomId` and the kind's
//! payload fields, e.g.
//!
//! ```json
//! {"type": "offer", "roomId": "test-room", "sdp": "v=0..."}
//! ```

use super::SignalingError;
use crate::hardware::HardwareProfile;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Envelope kinds, one subscription slot each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Join,
    PeerJoined,
    PeerLeft,
    Offer,
    Answer,
    Candidate,
    HardwareInfo,
    ChatMessage,
}

impl MessageKind {
    pub const ALL: [MessageKind; 8] = [
        MessageKind::Join,
        MessageKind::PeerJoined,
        MessageKind::PeerLeft,
        MessageKind::Offer,
        MessageKind::Answer,
        MessageKind::Candidate,
        MessageKind::HardwareInfo,
        MessageKind::ChatMessage,
    ];

    /// Value of the `type` field
    pub fn wire_name(&self) -> &'static str {
        match self {
            MessageKind::Join => "join-room",
            MessageKind::PeerJoined => "user-connected",
            MessageKind::PeerLeft => "user-disconnected",
            MessageKind::Offer => "offer",
            MessageKind::Answer => "answer",
            MessageKind::Candidate => "candidate",
            MessageKind::HardwareInfo => "hardware-info",
            MessageKind::ChatMessage => "chat-message",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_name() == name)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// ICE candidate fields as browsers serialize them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateInfo {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
}

/// Kind-specific payload of an envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalMessage {
    /// Enter a room
    #[serde(rename = "join-room")]
    Join {
        #[serde(rename = "peerId", default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<String>,
    },

    /// Another member entered the room
    #[serde(rename = "user-connected")]
    PeerJoined {
        #[serde(rename = "userId")]
        user_id: String,
    },

    /// A member left the room
    #[serde(rename = "user-disconnected")]
    PeerLeft {
        #[serde(rename = "userId")]
        user_id: String,
    },

    /// SDP offer
    #[serde(rename = "offer")]
    Offer { sdp: String },

    /// SDP answer
    #[serde(rename = "answer")]
    Answer { sdp: String },

    /// Trickled ICE candidate
    #[serde(rename = "candidate")]
    Candidate { candidate: IceCandidateInfo },

    /// Capability broadcast
    #[serde(rename = "hardware-info")]
    HardwareInfo { specs: HardwareProfile },

    /// Free-form chat line
    #[serde(rename = "chat-message")]
    ChatMessage { sender: String, message: String },
}

impl SignalMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            SignalMessage::Join { .. } => MessageKind::Join,
            SignalMessage::PeerJoined { .. } => MessageKind::PeerJoined,
            SignalMessage::PeerLeft { .. } => MessageKind::PeerLeft,
            SignalMessage::Offer { .. } => MessageKind::Offer,
            SignalMessage::Answer { .. } => MessageKind::Answer,
            SignalMessage::Candidate { .. } => MessageKind::Candidate,
            SignalMessage::HardwareInfo { .. } => MessageKind::HardwareInfo,
            SignalMessage::ChatMessage { .. } => MessageKind::ChatMessage,
        }
    }
}

/// A room-scoped message
#[derive(Debug, Clone, PartialEq)]
pub struct SignalingEnvelope {
    pub room_id: String,
    pub message: SignalMessage,
}

/// Result of decoding one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Known kind; `room_id` is `None` when the field was missing
    Envelope {
        room_id: Option<String>,
        message: SignalMessage,
    },
    /// A `type` this build does not know
    UnknownKind(String),
}

impl SignalingEnvelope {
    pub fn new(room_id: impl Into<String>, message: SignalMessage) -> Self {
        Self {
            room_id: room_id.into(),
            message,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    /// Serialize to a JSON text frame
    pub fn encode(&self) -> Result<String, SignalingError> {
        let mut value = serde_json::to_value(&self.message)
            .map_err(|e| SignalingError::Malformed(format!("Failed to serialize {}: {}", self.kind(), e)))?;
        match value.as_object_mut() {
            Some(object) => {
                object.insert("roomId".to_string(), Value::String(self.room_id.clone()));
            }
            None => return Err(SignalingError::Malformed(format!("{} is not an object", self.kind()))),
        }
        serde_json::to_string(&value).map_err(|e| SignalingError::Malformed(e.to_string()))
    }

    /// Parse a JSON text frame
    pub fn decode(text: &str) -> Result<Decoded, SignalingError> {
        let value: Value = serde_json::from_str(text.trim())
            .map_err(|e| SignalingError::Malformed(format!("Invalid JSON: {}", e)))?;

        let kind_name = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SignalingError::Malformed("Missing \"type\" field".to_string()))?;
        if MessageKind::from_wire(kind_name).is_none() {
            return Ok(Decoded::UnknownKind(kind_name.to_string()));
        }

        let room_id = value.get("roomId").and_then(Value::as_str).map(str::to_string);
        let message = serde_json::from_value(value)
            .map_err(|e| SignalingError::Malformed(format!("Invalid payload: {}", e)))?;

        Ok(Decoded::Envelope { room_id, message })
    }
}
