use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::bus::RoomBus;
use super::events::RoomEvent;
use crate::shared::AppError;
use crate::websockets::membership::MembershipIndex;

/// Channel prefix for cross-process room traffic
const CHANNEL_PREFIX: &str = "pairwire:room:";

/// Delay before a dropped subscriber connection is re-established
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

/// Wire envelope for mirrored room events
///
/// `origin` is the id of the emitting process. Subscribers drop their own
/// envelopes: local delivery already happened on the bus before publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: String,
    pub room_key: String,
    pub event: RoomEvent,
}

impl Envelope {
    pub fn channel(&self) -> String {
        format!("{CHANNEL_PREFIX}{}", self.room_key)
    }

    /// Whether a subscriber identified by `process_id` should act on this
    pub fn is_remote_to(&self, process_id: &str) -> bool {
        self.origin != process_id
    }
}

/// Mirrors locally emitted room events to every other server process
#[async_trait]
pub trait EventFanout: Send + Sync {
    /// Best effort: a failed publish is logged, never surfaced. Both
    /// participants of a room usually sit on the same process, so local
    /// delivery must not depend on the mirror.
    async fn publish(&self, room_key: &str, event: &RoomEvent);
}

/// Single-process deployments: nothing to mirror
pub struct LocalFanout;

#[async_trait]
impl EventFanout for LocalFanout {
    async fn publish(&self, _room_key: &str, _event: &RoomEvent) {}
}

/// Redis pub/sub fan-out connecting the processes of one deployment
///
/// Publishes this process's room events on per-room channels and feeds
/// remote envelopes back into the local bus, so a participant's frames
/// reach a peer admitted by a different process.
pub struct RedisFanout {
    conn: ConnectionManager,
    process_id: String,
}

impl RedisFanout {
    pub async fn connect(client: redis::Client, process_id: String) -> Result<Self, AppError> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, process_id })
    }

    /// Spawns the subscriber half: remote envelopes are re-emitted into
    /// `bus` and membership changes mirrored into `membership`. Runs until
    /// process shutdown; a dropped connection is logged and re-subscribed.
    pub fn spawn_subscriber(
        client: redis::Client,
        process_id: String,
        bus: RoomBus,
        membership: Arc<MembershipIndex>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match Self::run_subscriber(&client, &process_id, &bus, &membership).await {
                    Ok(()) => warn!("Fan-out subscription ended, re-subscribing"),
                    Err(e) => error!(error = %e, "Fan-out subscription failed, re-subscribing"),
                }
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
            }
        })
    }

    async fn run_subscriber(
        client: &redis::Client,
        process_id: &str,
        bus: &RoomBus,
        membership: &MembershipIndex,
    ) -> Result<(), redis::RedisError> {
        let conn = client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        pubsub.psubscribe(format!("{CHANNEL_PREFIX}*")).await?;
        info!("Fan-out subscriber attached");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Undecodable fan-out payload");
                    continue;
                }
            };
            let envelope: Envelope = match serde_json::from_str(&payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "Undecodable fan-out envelope");
                    continue;
                }
            };
            if !envelope.is_remote_to(process_id) {
                continue;
            }

            debug!(
                room_key = %envelope.room_key,
                origin = %envelope.origin,
                event = envelope.event.event_type(),
                "Mirroring remote room event"
            );

            let Envelope {
                room_key, event, ..
            } = envelope;
            match &event {
                RoomEvent::PeerJoined { peer, .. } => {
                    membership.apply_remote_join(&room_key, peer).await;
                }
                RoomEvent::PeerLeft { peer, .. } => {
                    membership.apply_remote_leave(&room_key, peer).await;
                }
                RoomEvent::RoomReaped => {
                    membership.apply_room_reaped(&room_key).await;
                }
                RoomEvent::Signal { .. } => {}
            }
            bus.emit_to_room(&room_key, event).await;
        }

        Ok(())
    }
}

#[async_trait]
impl EventFanout for RedisFanout {
    async fn publish(&self, room_key: &str, event: &RoomEvent) {
        let envelope = Envelope {
            origin: self.process_id.clone(),
            room_key: room_key.to_string(),
            event: event.clone(),
        };
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                error!(room_key = %room_key, error = %e, "Failed to serialize fan-out envelope");
                return;
            }
        };

        let mut conn = self.conn.clone();
        if let Err(e) = redis::cmd("PUBLISH")
            .arg(envelope.channel())
            .arg(payload)
            .query_async::<_, i64>(&mut conn)
            .await
        {
            warn!(room_key = %room_key, error = %e, "Failed to publish room event to peers");
        }
    }
}
