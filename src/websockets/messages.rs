use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message types for WebSocket communication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    // Client -> Server, relayed back out Server -> Client
    Signal,

    // Server -> Client
    PeerJoined,
    PeerLeft,
    RoomFull,
    Error,
}

/// Metadata for WebSocket messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessageMeta {
    pub timestamp: DateTime<Utc>,
    /// Connection id the frame concerns: the sender of a relayed SIGNAL,
    /// or the subject of a presence frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
}

/// Base structure for WebSocket messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// For SIGNAL frames this is the relayed payload, passed through
    /// byte-for-byte; the server never inspects it.
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<WsMessageMeta>,
}

/// Server-to-Client message payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerPresencePayload {
    /// Connection id of the peer that joined or left
    pub peer: String,
    /// Roster after the change, in join order
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Helper functions for creating messages
impl WsMessage {
    pub fn new(message_type: MessageType, payload: serde_json::Value) -> Self {
        Self {
            message_type,
            payload,
            meta: Some(WsMessageMeta {
                timestamp: Utc::now(),
                peer: None,
            }),
        }
    }

    fn with_peer(message_type: MessageType, payload: serde_json::Value, peer: String) -> Self {
        Self {
            message_type,
            payload,
            meta: Some(WsMessageMeta {
                timestamp: Utc::now(),
                peer: Some(peer),
            }),
        }
    }

    /// Create a PEER_JOINED message
    pub fn peer_joined(peer: String, participants: Vec<String>) -> Self {
        let payload = PeerPresencePayload {
            peer: peer.clone(),
            participants,
        };
        Self::with_peer(
            MessageType::PeerJoined,
            serde_json::to_value(payload).unwrap(),
            peer,
        )
    }

    /// Create a PEER_LEFT message
    pub fn peer_left(peer: String, participants: Vec<String>) -> Self {
        let payload = PeerPresencePayload {
            peer: peer.clone(),
            participants,
        };
        Self::with_peer(
            MessageType::PeerLeft,
            serde_json::to_value(payload).unwrap(),
            peer,
        )
    }

    /// Create a SIGNAL message relaying `payload` on behalf of `from`
    pub fn signal(from: String, payload: serde_json::Value) -> Self {
        Self::with_peer(MessageType::Signal, payload, from)
    }

    /// Create a ROOM_FULL message
    pub fn room_full() -> Self {
        let payload = ErrorPayload {
            message: "Room already has two participants".to_string(),
        };
        Self::new(
            MessageType::RoomFull,
            serde_json::to_value(payload).unwrap(),
        )
    }

    /// Create an ERROR message
    pub fn error(message: String) -> Self {
        let payload = ErrorPayload { message };
        Self::new(MessageType::Error, serde_json::to_value(payload).unwrap())
    }
}
