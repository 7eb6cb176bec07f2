use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use super::hasher::RoomKey;
use super::models::RoomRecord;
use super::store::PresenceStore;
use crate::config::ReaperConfig;
use crate::event::{EventFanout, RoomEvent};
use crate::shared::AppError;
use crate::websockets::membership::MembershipIndex;

/// Starts the background task that periodically evicts inactive rooms
///
/// Runs until process shutdown. A failed cycle is logged and retried on
/// the next interval; a store outage never takes the process down.
#[instrument(skip(store, fanout, membership, config))]
pub async fn start_reaper(
    store: Arc<dyn PresenceStore>,
    fanout: Arc<dyn EventFanout>,
    membership: Arc<MembershipIndex>,
    config: ReaperConfig,
) {
    info!(
        interval_secs = config.interval.as_secs(),
        inactivity_threshold_secs = config.inactivity_threshold.as_secs(),
        "Starting room reaper background task"
    );

    let mut reap_interval = interval(config.interval);

    loop {
        reap_interval.tick().await;

        match reap_cycle(&store, &fanout, &membership, config.inactivity_threshold).await {
            Ok(reaped_count) => {
                info!(reaped_count = reaped_count, "Room reap cycle completed");
            }
            Err(e) => {
                error!(error = %e, "Room reap cycle failed");
            }
        }
    }
}

/// One full reap pass: evicts stale records, then announces every reaped
/// key so this process and its peers drop the room from their membership
/// mirrors. Without the announcement, members a dead process never
/// unpublished would keep the room on waiting lists forever.
pub async fn reap_cycle(
    store: &Arc<dyn PresenceStore>,
    fanout: &Arc<dyn EventFanout>,
    membership: &MembershipIndex,
    inactivity_threshold: Duration,
) -> Result<usize, AppError> {
    let reaped = reap_stale_rooms(store, inactivity_threshold).await?;

    for room_key in &reaped {
        membership.apply_room_reaped(room_key.as_str()).await;
        fanout
            .publish(room_key.as_str(), &RoomEvent::RoomReaped)
            .await;
    }

    Ok(reaped.len())
}

/// Evicts every room whose last activity is older than the threshold and
/// returns the reaped keys
///
/// Each delete is guarded by the raw record observed during the scan, so
/// a join or relayed message landing mid-cycle keeps its room. Records
/// that no longer decode are evicted too; nothing can revive them.
#[instrument(skip(store))]
pub async fn reap_stale_rooms(
    store: &Arc<dyn PresenceStore>,
    inactivity_threshold: Duration,
) -> Result<Vec<RoomKey>, AppError> {
    let rooms = store.list_rooms().await?;

    if rooms.is_empty() {
        debug!("No rooms to inspect");
        return Ok(Vec::new());
    }

    let now = Utc::now();
    let mut reaped = Vec::new();

    for (room_key, raw) in rooms {
        let stale = match serde_json::from_str::<RoomRecord>(&raw) {
            Ok(record) => record.is_stale(inactivity_threshold, now),
            Err(e) => {
                warn!(room_key = %room_key, error = %e, "Undecodable room record, evicting");
                true
            }
        };

        if !stale {
            continue;
        }

        match store.remove_room_if(&room_key, &raw).await {
            Ok(true) => {
                info!(room_key = %room_key, "Reaped inactive room");
                reaped.push(room_key);
            }
            Ok(false) => {
                debug!(room_key = %room_key, "Room changed since scan, skipping");
            }
            Err(e) => {
                warn!(
                    room_key = %room_key,
                    error = %e,
                    "Failed to reap inactive room"
                );
            }
        }
    }

    Ok(reaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LocalFanout;
    use crate::room::store::InMemoryPresenceStore;
    use crate::shared::test_utils::FailingPresenceStore;

    fn as_store(store: Arc<InMemoryPresenceStore>) -> Arc<dyn PresenceStore> {
        store
    }

    #[tokio::test]
    async fn test_reap_removes_inactive_rooms() {
        let concrete = Arc::new(InMemoryPresenceStore::new());
        let store = as_store(concrete.clone());

        concrete
            .join_room(&RoomKey::new("room-a"), "conn-1")
            .await
            .unwrap();
        assert!(concrete
            .fetch_room(&RoomKey::new("room-a"))
            .await
            .unwrap()
            .is_some());

        // Wait a bit so the room goes stale against a tiny threshold
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;

        let reaped = reap_stale_rooms(&store, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(reaped, vec![RoomKey::new("room-a")]);

        assert!(concrete
            .fetch_room(&RoomKey::new("room-a"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_reap_preserves_active_rooms() {
        let concrete = Arc::new(InMemoryPresenceStore::new());
        let store = as_store(concrete.clone());

        concrete
            .join_room(&RoomKey::new("room-a"), "conn-1")
            .await
            .unwrap();

        let reaped = reap_stale_rooms(&store, Duration::from_secs(24 * 60 * 60))
            .await
            .unwrap();
        assert!(reaped.is_empty());

        assert!(concrete
            .fetch_room(&RoomKey::new("room-a"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_reap_collects_emptied_rooms() {
        let concrete = Arc::new(InMemoryPresenceStore::new());
        let store = as_store(concrete.clone());

        // Join and leave, leaving an empty record behind
        concrete
            .join_room(&RoomKey::new("room-a"), "conn-1")
            .await
            .unwrap();
        concrete
            .leave_room(&RoomKey::new("room-a"), "conn-1")
            .await
            .unwrap();
        assert!(concrete
            .fetch_room(&RoomKey::new("room-a"))
            .await
            .unwrap()
            .is_some());

        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;

        let reaped = reap_stale_rooms(&store, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(reaped.len(), 1);
    }

    #[tokio::test]
    async fn test_reap_handles_multiple_rooms() {
        let concrete = Arc::new(InMemoryPresenceStore::new());
        let store = as_store(concrete.clone());

        for name in ["room-a", "room-b", "room-c"] {
            concrete
                .join_room(&RoomKey::new(name), "conn-1")
                .await
                .unwrap();
        }

        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;

        let reaped = reap_stale_rooms(&store, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(reaped.len(), 3);
    }

    #[tokio::test]
    async fn test_reap_with_no_rooms() {
        let store = as_store(Arc::new(InMemoryPresenceStore::new()));

        let reaped = reap_stale_rooms(&store, Duration::from_millis(1))
            .await
            .unwrap();
        assert!(reaped.is_empty());
    }

    #[tokio::test]
    async fn test_reap_cycles_are_idempotent() {
        let concrete = Arc::new(InMemoryPresenceStore::new());
        let store = as_store(concrete.clone());

        concrete
            .join_room(&RoomKey::new("room-a"), "conn-1")
            .await
            .unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;

        let first = reap_stale_rooms(&store, Duration::from_millis(1))
            .await
            .unwrap();
        let second = reap_stale_rooms(&store, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_reap_surfaces_store_outage() {
        let store: Arc<dyn PresenceStore> = Arc::new(FailingPresenceStore);

        let result = reap_stale_rooms(&store, Duration::from_millis(1)).await;
        assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_refreshed_room_survives_the_cycle() {
        let concrete = Arc::new(InMemoryPresenceStore::new());
        let store = as_store(concrete.clone());

        concrete
            .join_room(&RoomKey::new("room-a"), "conn-1")
            .await
            .unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;

        // Fresh activity after the room went stale resets the clock
        concrete.touch_room(&RoomKey::new("room-a")).await.unwrap();

        let reaped = reap_stale_rooms(&store, Duration::from_millis(5))
            .await
            .unwrap();
        assert!(reaped.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_clears_the_membership_mirror() {
        let concrete = Arc::new(InMemoryPresenceStore::new());
        let store = as_store(concrete.clone());
        let fanout: Arc<dyn EventFanout> = Arc::new(LocalFanout);
        let membership = MembershipIndex::new();

        // A room whose only member lives on a process that died without
        // publishing its leave
        concrete
            .join_room(&RoomKey::new("room-a"), "remote-conn")
            .await
            .unwrap();
        membership.apply_remote_join("room-a", "remote-conn").await;
        assert!(membership.waiting_rooms().await.contains("room-a"));

        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;

        let reaped = reap_cycle(&store, &fanout, &membership, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(reaped, 1);

        assert!(concrete
            .fetch_room(&RoomKey::new("room-a"))
            .await
            .unwrap()
            .is_none());
        assert!(membership.waiting_rooms().await.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_leaves_live_mirrors_alone() {
        let concrete = Arc::new(InMemoryPresenceStore::new());
        let store = as_store(concrete.clone());
        let fanout: Arc<dyn EventFanout> = Arc::new(LocalFanout);
        let membership = MembershipIndex::new();

        concrete
            .join_room(&RoomKey::new("room-a"), "remote-conn")
            .await
            .unwrap();
        membership.apply_remote_join("room-a", "remote-conn").await;

        let reaped = reap_cycle(&store, &fanout, &membership, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(reaped, 0);

        assert!(membership.waiting_rooms().await.contains("room-a"));
    }
}
