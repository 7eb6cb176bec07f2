use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::hasher::RoomKey;
use super::store::PresenceStore;
use crate::shared::AppError;

/// Service for tracking room activity timestamps
pub struct ActivityTracker {
    store: Arc<dyn PresenceStore>,
}

impl ActivityTracker {
    /// Creates a new activity tracker over the given presence store
    pub fn new(store: Arc<dyn PresenceStore>) -> Self {
        Self { store }
    }

    /// Records activity in a room by updating its last_activity_at
    /// timestamp. A vanished record is logged rather than surfaced: the
    /// reaper may have collected the room mid-session, and the next join
    /// recreates it.
    #[instrument(skip(self))]
    pub async fn record_activity(&self, room_key: &RoomKey) -> Result<(), AppError> {
        debug!(room_key = %room_key, "Recording room activity");
        if !self.store.touch_room(room_key).await? {
            warn!(room_key = %room_key, "Recorded activity for a room with no record");
        }
        Ok(())
    }
}
