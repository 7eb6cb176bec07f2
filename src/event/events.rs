use serde::{Deserialize, Serialize};

/// Events that move through a room's fan-out channel
///
/// Events represent facts about things that have already happened. Each
/// one carries everything a subscriber needs to act on it, so a peer
/// process can mirror the change without reading the presence store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoomEvent {
    /// A participant finished joining; `participants` is the post-join roster
    PeerJoined {
        peer: String,
        participants: Vec<String>,
    },

    /// A participant left, whether cleanly or by transport drop
    PeerLeft {
        peer: String,
        participants: Vec<String>,
    },

    /// Opaque relay payload from one participant, headed to the other.
    /// The server never interprets `payload`.
    Signal {
        from: String,
        payload: serde_json::Value,
    },

    /// The room's record was evicted by the reaper. Carries nothing; the
    /// room key rides the envelope.
    RoomReaped,
}

impl RoomEvent {
    /// Get a human-readable description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            RoomEvent::PeerJoined { .. } => "peer_joined",
            RoomEvent::PeerLeft { .. } => "peer_left",
            RoomEvent::Signal { .. } => "signal",
            RoomEvent::RoomReaped => "room_reaped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_labels() {
        let joined = RoomEvent::PeerJoined {
            peer: "conn-1".to_string(),
            participants: vec!["conn-1".to_string()],
        };
        assert_eq!(joined.event_type(), "peer_joined");

        let signal = RoomEvent::Signal {
            from: "conn-1".to_string(),
            payload: serde_json::json!({"sdp": "offer"}),
        };
        assert_eq!(signal.event_type(), "signal");
    }

    #[test]
    fn test_wire_form_is_tagged() {
        let event = RoomEvent::PeerLeft {
            peer: "conn-2".to_string(),
            participants: vec!["conn-1".to_string()],
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value.get("kind"), Some(&serde_json::json!("peer_left")));

        let parsed: RoomEvent = serde_json::from_value(value).unwrap();
        assert!(matches!(parsed, RoomEvent::PeerLeft { .. }));
    }

    #[test]
    fn test_room_reaped_wire_form() {
        let value = serde_json::to_value(RoomEvent::RoomReaped).unwrap();
        assert_eq!(value, serde_json::json!({"kind": "room_reaped"}));

        let parsed: RoomEvent = serde_json::from_value(value).unwrap();
        assert!(matches!(parsed, RoomEvent::RoomReaped));
    }
}
