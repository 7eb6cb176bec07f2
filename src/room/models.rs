use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard cap on participants per room. Pairing is strictly two-party; a
/// third join attempt is rejected no matter what the client claims.
pub const ROOM_CAPACITY: usize = 2;

/// Room state as persisted in the presence store, one record per room key.
///
/// Serialized as camelCase JSON so every server process reads the same
/// layout. Fields this server does not own (room-level metadata written by
/// other components) are carried through `metadata` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    /// Connection ids currently in the room, in join order.
    #[serde(default)]
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped on join, leave, and relayed traffic; the reaper evicts
    /// records this timestamp has gone stale on.
    pub last_activity_at: DateTime<Utc>,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RoomRecord {
    /// Creates an empty record stamped at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            participants: Vec::new(),
            created_at: now,
            last_activity_at: now,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Check if the room is at capacity (2 participants)
    pub fn is_full(&self) -> bool {
        self.participants.len() >= ROOM_CAPACITY
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Check if a connection is in this room
    pub fn has_participant(&self, connection_id: &str) -> bool {
        self.participants.iter().any(|p| p == connection_id)
    }

    /// Add a participant; duplicates are ignored. Capacity is the store's
    /// concern, not the record's.
    pub fn add_participant(&mut self, connection_id: String) {
        if !self.has_participant(&connection_id) {
            self.participants.push(connection_id);
        }
    }

    /// Remove a participant from the room
    pub fn remove_participant(&mut self, connection_id: &str) {
        self.participants.retain(|p| p != connection_id);
    }

    /// Marks the room active at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    /// Whether the room has been idle longer than `threshold` as of `now`.
    /// A last-activity timestamp in the future reads as not stale.
    pub fn is_stale(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.last_activity_at).to_std() {
            Ok(age) => age > threshold,
            Err(_) => false,
        }
    }
}

impl Default for RoomRecord {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_new_record_is_empty_and_fresh() {
        let now = fixed_now();
        let record = RoomRecord::new(now);
        assert!(record.is_empty());
        assert!(!record.is_full());
        assert_eq!(record.created_at, now);
        assert_eq!(record.last_activity_at, now);
    }

    #[test]
    fn test_capacity_is_two() {
        let mut record = RoomRecord::new(fixed_now());
        record.add_participant("conn-1".to_string());
        assert!(!record.is_full());
        record.add_participant("conn-2".to_string());
        assert!(record.is_full());
    }

    #[test]
    fn test_add_participant_ignores_duplicates() {
        let mut record = RoomRecord::new(fixed_now());
        record.add_participant("conn-1".to_string());
        record.add_participant("conn-1".to_string());
        assert_eq!(record.participant_count(), 1);
    }

    #[test]
    fn test_remove_participant() {
        let mut record = RoomRecord::new(fixed_now());
        record.add_participant("conn-1".to_string());
        record.add_participant("conn-2".to_string());
        record.remove_participant("conn-1");
        assert_eq!(record.participants, vec!["conn-2".to_string()]);
        record.remove_participant("not-here");
        assert_eq!(record.participant_count(), 1);
    }

    #[test]
    fn test_staleness_threshold() {
        let now = fixed_now();
        let mut record = RoomRecord::new(now - chrono::Duration::hours(25));
        assert!(record.is_stale(Duration::from_secs(86_400), now));

        record.touch(now - chrono::Duration::hours(1));
        assert!(!record.is_stale(Duration::from_secs(86_400), now));
    }

    #[test]
    fn test_future_activity_is_not_stale() {
        let now = fixed_now();
        let record = RoomRecord::new(now + chrono::Duration::hours(1));
        assert!(!record.is_stale(Duration::from_secs(0), now));
    }

    #[test]
    fn test_serializes_as_camel_case() {
        let record = RoomRecord::new(fixed_now());
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("participants").is_some());
        assert!(value.get("createdAt").is_some());
        assert!(value.get("lastActivityAt").is_some());
    }

    #[test]
    fn test_unknown_fields_round_trip_through_metadata() {
        let raw = r#"{
            "participants": ["conn-1"],
            "createdAt": "2024-05-01T12:00:00Z",
            "lastActivityAt": "2024-05-01T12:00:00Z",
            "locked": true
        }"#;
        let record: RoomRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.metadata.get("locked"), Some(&serde_json::json!(true)));

        let reserialized = serde_json::to_value(&record).unwrap();
        assert_eq!(reserialized.get("locked"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn test_missing_participants_defaults_to_empty() {
        let raw = r#"{
            "createdAt": "2024-05-01T12:00:00Z",
            "lastActivityAt": "2024-05-01T12:00:00Z"
        }"#;
        let record: RoomRecord = serde_json::from_str(raw).unwrap();
        assert!(record.is_empty());
    }
}
