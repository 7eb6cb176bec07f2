use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::hasher::RoomKey;
use super::models::RoomRecord;
use crate::shared::AppError;

/// Result of attempting to join a room
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    /// Participant was appended; returns the updated record
    Joined(RoomRecord),
    /// Participant was already in the record; nothing changed
    AlreadyJoined(RoomRecord),
    /// Room already holds two participants. Carries the record as observed
    /// so a caller racing another join re-evaluates from current state.
    RoomFull(RoomRecord),
}

/// Result of attempting to leave a room
#[derive(Debug, Clone)]
pub enum LeaveOutcome {
    /// Participant was removed; returns the updated record. An emptied
    /// record stays in the store until the reaper collects it.
    Left(RoomRecord),
    /// Participant was not in the record
    NotInRoom,
    /// No record exists under this key
    RoomNotFound,
}

/// Shared room presence state, keyed by room key.
///
/// Every mutation is a single atomic read-modify-write against the store,
/// so concurrent connections and concurrent server processes never lose
/// updates or overfill a room.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Read-only fetch. Never creates a record; rooms nobody has joined
    /// do not exist.
    async fn fetch_room(&self, room_key: &RoomKey) -> Result<Option<RoomRecord>, AppError>;

    /// Atomically adds `connection_id` to the room, creating the record on
    /// first join. Re-joining with the same id reports `AlreadyJoined`
    /// even when the room is otherwise full.
    async fn join_room(
        &self,
        room_key: &RoomKey,
        connection_id: &str,
    ) -> Result<JoinOutcome, AppError>;

    /// Atomically removes `connection_id` and bumps the activity timestamp.
    async fn leave_room(
        &self,
        room_key: &RoomKey,
        connection_id: &str,
    ) -> Result<LeaveOutcome, AppError>;

    /// Bumps `last_activity_at`; returns false when no record exists.
    async fn touch_room(&self, room_key: &RoomKey) -> Result<bool, AppError>;

    /// Every record with its raw serialized form. The raw form is the
    /// witness for `remove_room_if` guarded deletes.
    async fn list_rooms(&self) -> Result<Vec<(RoomKey, String)>, AppError>;

    /// Deletes the record only if its stored form still equals
    /// `expected_raw`. An absent record is a no-op. Returns whether a
    /// delete happened.
    async fn remove_room_if(&self, room_key: &RoomKey, expected_raw: &str)
        -> Result<bool, AppError>;
}

/// In-memory implementation of PresenceStore for development and testing
pub struct InMemoryPresenceStore {
    rooms: Mutex<HashMap<String, RoomRecord>>,
}

impl Default for InMemoryPresenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPresenceStore {
    /// Creates a new empty in-memory store
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresenceStore {
    #[instrument(skip(self))]
    async fn fetch_room(&self, room_key: &RoomKey) -> Result<Option<RoomRecord>, AppError> {
        debug!(room_key = %room_key, "Fetching room record from memory");

        let rooms = self.rooms.lock().unwrap();
        Ok(rooms.get(room_key.as_str()).cloned())
    }

    #[instrument(skip(self))]
    async fn join_room(
        &self,
        room_key: &RoomKey,
        connection_id: &str,
    ) -> Result<JoinOutcome, AppError> {
        debug!(room_key = %room_key, connection_id = %connection_id, "Attempting to join room atomically");

        let mut rooms = self.rooms.lock().unwrap();
        let record = rooms
            .entry(room_key.as_str().to_string())
            .or_insert_with(|| RoomRecord::new(Utc::now()));

        if record.has_participant(connection_id) {
            debug!(room_key = %room_key, connection_id = %connection_id, "Participant already in room");
            return Ok(JoinOutcome::AlreadyJoined(record.clone()));
        }

        if record.is_full() {
            debug!(room_key = %room_key, participant_count = record.participant_count(), "Room is full");
            return Ok(JoinOutcome::RoomFull(record.clone()));
        }

        record.add_participant(connection_id.to_string());
        record.touch(Utc::now());
        let updated = record.clone();

        info!(
            room_key = %room_key,
            connection_id = %connection_id,
            participant_count = updated.participant_count(),
            "Participant joined room"
        );

        Ok(JoinOutcome::Joined(updated))
    }

    #[instrument(skip(self))]
    async fn leave_room(
        &self,
        room_key: &RoomKey,
        connection_id: &str,
    ) -> Result<LeaveOutcome, AppError> {
        debug!(room_key = %room_key, connection_id = %connection_id, "Attempting to leave room atomically");

        let mut rooms = self.rooms.lock().unwrap();
        let record = match rooms.get_mut(room_key.as_str()) {
            Some(record) => record,
            None => {
                debug!(room_key = %room_key, "Room not found");
                return Ok(LeaveOutcome::RoomNotFound);
            }
        };

        if !record.has_participant(connection_id) {
            debug!(room_key = %room_key, connection_id = %connection_id, "Participant not in room");
            return Ok(LeaveOutcome::NotInRoom);
        }

        record.remove_participant(connection_id);
        record.touch(Utc::now());

        // Emptied records are kept; deletion is the reaper's job, so a
        // reconnecting peer never races a delete-then-recreate.
        let updated = record.clone();

        info!(
            room_key = %room_key,
            connection_id = %connection_id,
            participant_count = updated.participant_count(),
            "Participant left room"
        );

        Ok(LeaveOutcome::Left(updated))
    }

    #[instrument(skip(self))]
    async fn touch_room(&self, room_key: &RoomKey) -> Result<bool, AppError> {
        let mut rooms = self.rooms.lock().unwrap();
        match rooms.get_mut(room_key.as_str()) {
            Some(record) => {
                record.touch(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self))]
    async fn list_rooms(&self) -> Result<Vec<(RoomKey, String)>, AppError> {
        let rooms = self.rooms.lock().unwrap();
        let mut listed = Vec::with_capacity(rooms.len());
        for (key, record) in rooms.iter() {
            let raw = serde_json::to_string(record)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            listed.push((RoomKey::new(key.clone()), raw));
        }
        Ok(listed)
    }

    #[instrument(skip(self, expected_raw))]
    async fn remove_room_if(
        &self,
        room_key: &RoomKey,
        expected_raw: &str,
    ) -> Result<bool, AppError> {
        let mut rooms = self.rooms.lock().unwrap();
        let current = match rooms.get(room_key.as_str()) {
            Some(record) => record,
            None => return Ok(false),
        };

        let current_raw = serde_json::to_string(current)
            .map_err(|e| AppError::Serialization(e.to_string()))?;
        if current_raw != expected_raw {
            warn!(room_key = %room_key, "Record changed since scan, skipping delete");
            return Ok(false);
        }

        rooms.remove(room_key.as_str());
        info!(room_key = %room_key, "Room record removed");
        Ok(true)
    }
}
