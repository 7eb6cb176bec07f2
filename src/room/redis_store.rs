use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, info, instrument, warn};

use super::hasher::RoomKey;
use super::models::RoomRecord;
use super::store::{JoinOutcome, LeaveOutcome, PresenceStore};
use crate::shared::AppError;

/// Redis hash holding every room record: field = room key, value = JSON
pub const ROOMS_KEY: &str = "rooms";

/// Writes the field only if its current value still matches what the
/// caller read, with absence encoded as the empty string. Returns 1 on
/// write, 0 on conflict.
const GUARDED_WRITE_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], ARGV[1])
if current == false then
  current = ''
end
if current == ARGV[2] then
  redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
  return 1
end
return 0
"#;

/// Deletes the field only if its current value matches. An absent field
/// returns 0, which makes repeated reaps of the same room a no-op.
const GUARDED_DELETE_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], ARGV[1])
if current == false then
  return 0
end
if current == ARGV[2] then
  return redis.call('HDEL', KEYS[1], ARGV[1])
end
return 0
"#;

/// Redis implementation of PresenceStore, shared by every server process
///
/// Records are mutated with an optimistic read-modify-write loop: read the
/// raw JSON, apply the change in Rust, then write back through a guarded
/// Lua script that only applies if the raw value is unchanged. A lost race
/// re-reads the winner's state and re-evaluates, so two processes admitting
/// into the same room converge on one two-participant record.
pub struct RedisPresenceStore {
    conn: ConnectionManager,
    guarded_write: Script,
    guarded_delete: Script,
}

impl RedisPresenceStore {
    /// Connects and hands back a store over an auto-reconnecting
    /// multiplexed connection.
    pub async fn connect(client: redis::Client) -> Result<Self, AppError> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            guarded_write: Script::new(GUARDED_WRITE_SCRIPT),
            guarded_delete: Script::new(GUARDED_DELETE_SCRIPT),
        })
    }

    async fn read_raw(&self, room_key: &RoomKey) -> Result<Option<String>, AppError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("HGET")
            .arg(ROOMS_KEY)
            .arg(room_key.as_str())
            .query_async(&mut conn)
            .await?;
        Ok(raw)
    }

    /// Compare-and-set write; `expected` is the raw value read beforehand,
    /// empty when the record did not exist.
    async fn write_if_unchanged(
        &self,
        room_key: &RoomKey,
        expected: &str,
        next: &str,
    ) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let applied: i32 = self
            .guarded_write
            .key(ROOMS_KEY)
            .arg(room_key.as_str())
            .arg(expected)
            .arg(next)
            .invoke_async(&mut conn)
            .await?;
        Ok(applied == 1)
    }

    fn encode(record: &RoomRecord) -> Result<String, AppError> {
        serde_json::to_string(record).map_err(|e| AppError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    #[instrument(skip(self))]
    async fn fetch_room(&self, room_key: &RoomKey) -> Result<Option<RoomRecord>, AppError> {
        let raw = match self.read_raw(room_key).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // Unreadable records admit like absent ones; the reaper
                // clears them and the next join overwrites them.
                warn!(room_key = %room_key, error = %e, "Undecodable room record");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self))]
    async fn join_room(
        &self,
        room_key: &RoomKey,
        connection_id: &str,
    ) -> Result<JoinOutcome, AppError> {
        debug!(room_key = %room_key, connection_id = %connection_id, "Attempting to join room atomically");

        loop {
            let raw = self.read_raw(room_key).await?;
            let expected = raw.clone().unwrap_or_default();

            let mut record = match raw.as_deref() {
                None => RoomRecord::new(Utc::now()),
                Some(raw) => match serde_json::from_str::<RoomRecord>(raw) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(room_key = %room_key, error = %e, "Replacing undecodable room record");
                        RoomRecord::new(Utc::now())
                    }
                },
            };

            if record.has_participant(connection_id) {
                debug!(room_key = %room_key, connection_id = %connection_id, "Participant already in room");
                return Ok(JoinOutcome::AlreadyJoined(record));
            }

            if record.is_full() {
                debug!(room_key = %room_key, participant_count = record.participant_count(), "Room is full");
                return Ok(JoinOutcome::RoomFull(record));
            }

            record.add_participant(connection_id.to_string());
            record.touch(Utc::now());

            let next = Self::encode(&record)?;
            if self.write_if_unchanged(room_key, &expected, &next).await? {
                info!(
                    room_key = %room_key,
                    connection_id = %connection_id,
                    participant_count = record.participant_count(),
                    "Participant joined room"
                );
                return Ok(JoinOutcome::Joined(record));
            }

            debug!(room_key = %room_key, "Join raced another writer, re-reading");
        }
    }

    #[instrument(skip(self))]
    async fn leave_room(
        &self,
        room_key: &RoomKey,
        connection_id: &str,
    ) -> Result<LeaveOutcome, AppError> {
        debug!(room_key = %room_key, connection_id = %connection_id, "Attempting to leave room atomically");

        loop {
            let raw = match self.read_raw(room_key).await? {
                Some(raw) => raw,
                None => {
                    debug!(room_key = %room_key, "Room not found");
                    return Ok(LeaveOutcome::RoomNotFound);
                }
            };

            let mut record = match serde_json::from_str::<RoomRecord>(&raw) {
                Ok(record) => record,
                Err(e) => {
                    // Nobody can be a member of an unreadable record
                    warn!(room_key = %room_key, error = %e, "Undecodable room record");
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
            let next = Self::encode(&record)?;
            if self.write_if_unchanged(room_key, &raw, &next).await? {
                info!(
                    room_key = %room_key,
                    connection_id = %connection_id,
                    participant_count = record.participant_count(),
                    "Participant left room"
                );
                return Ok(LeaveOutcome::Left(record));
            }

            debug!(room_key = %room_key, "Leave raced another writer, re-reading");
        }
    }

    #[instrument(skip(self))]
    async fn touch_room(&self, room_key: &RoomKey) -> Result<bool, AppError> {
        loop {
            let raw = match self.read_raw(room_key).await? {
                Some(raw) => raw,
                None => return Ok(false),
            };

            let mut record = match serde_json::from_str::<RoomRecord>(&raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!(room_key = %room_key, error = %e, "Undecodable room record");
                    return Ok(false);
                }
            };

            record.touch(Utc::now());

            let next = Self::encode(&record)?;
            if self.write_if_unchanged(room_key, &raw, &next).await? {
                return Ok(true);
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_rooms(&self) -> Result<Vec<(RoomKey, String)>, AppError> {
        let mut conn = self.conn.clone();
        let entries: Vec<(String, String)> = redis::cmd("HGETALL")
            .arg(ROOMS_KEY)
            .query_async(&mut conn)
            .await?;

        Ok(entries
            .into_iter()
            .map(|(key, raw)| (RoomKey::new(key), raw))
            .collect())
    }

    #[instrument(skip(self, expected_raw))]
    async fn remove_room_if(
        &self,
        room_key: &RoomKey,
        expected_raw: &str,
    ) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let deleted: i32 = self
            .guarded_delete
            .key(ROOMS_KEY)
            .arg(room_key.as_str())
            .arg(expected_raw)
            .invoke_async(&mut conn)
            .await?;

        if deleted == 1 {
            info!(room_key = %room_key, "Room record removed");
        }
        Ok(deleted == 1)
    }
}
