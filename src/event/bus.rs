use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::events::RoomEvent;

/// Distributes room events to the connections of this process
///
/// The bus is purely local: one broadcast channel per room key, created
/// lazily on first subscribe and released once the last local subscriber
/// is gone. Mirroring events to other server processes is the fan-out's
/// job, not the bus's.
#[derive(Debug, Clone)]
pub struct RoomBus {
    /// Room-specific event channels: room_key -> sender
    room_channels: Arc<RwLock<HashMap<String, broadcast::Sender<RoomEvent>>>>,
}

impl Default for RoomBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomBus {
    pub fn new() -> Self {
        Self {
            room_channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Emits an event to all local subscribers of a specific room
    ///
    /// A room with no local channel drops the event: broadcast receivers
    /// only see events sent after they subscribe, so there is nobody a
    /// buffered copy could ever reach.
    pub async fn emit_to_room(&self, room_key: &str, event: RoomEvent) {
        let room_channels = self.room_channels.read().await;

        match room_channels.get(room_key) {
            Some(sender) => match sender.send(event) {
                Ok(receiver_count) => {
                    debug!(
                        room_key = %room_key,
                        receivers = receiver_count,
                        "Room event emitted"
                    );
                }
                Err(_) => {
                    debug!(room_key = %room_key, "Room event emitted with no receivers");
                }
            },
            None => {
                debug!(room_key = %room_key, "No local subscribers for room, event dropped");
            }
        }
    }

    /// Subscribe to events for a specific room
    pub async fn subscribe_to_room(&self, room_key: &str) -> broadcast::Receiver<RoomEvent> {
        let room_channels = self.room_channels.read().await;

        if let Some(sender) = room_channels.get(room_key) {
            sender.subscribe()
        } else {
            debug!(room_key = %room_key, "Creating new room channel for subscription");
            drop(room_channels);

            let mut room_channels = self.room_channels.write().await;
            room_channels
                .entry(room_key.to_string())
                .or_insert_with(|| broadcast::channel(100).0)
                .subscribe()
        }
    }

    /// Drops a room's channel once its last local subscriber is gone.
    ///
    /// Called on connection teardown, after the subscription is dropped.
    /// A room that still has receivers keeps its channel; the next call
    /// after the last one leaves removes it.
    pub async fn release_room(&self, room_key: &str) {
        let mut room_channels = self.room_channels.write().await;
        if let Some(sender) = room_channels.get(room_key) {
            if sender.receiver_count() == 0 {
                debug!(room_key = %room_key, "Releasing idle room channel");
                room_channels.remove(room_key);
            }
        }
    }
}
