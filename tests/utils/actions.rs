use pairwire::room::RoomRecord;
use pairwire::shared::AppError;
use pairwire::websockets::admit;

use super::setup::{ConnectedPeer, TestSetup};

// ============================================================================
// Action Helpers
// ============================================================================

impl TestSetup {
    /// Runs the connect sequence a websocket upgrade performs: admission,
    /// enrollment, room subscription, then the atomic join. Subscribing
    /// before the join means a peer's own PEER_JOINED is buffered too.
    pub async fn connect(&self, token: &str) -> Result<ConnectedPeer, AppError> {
        let mut session = admit(&self.state, Some(token)).await?;
        self.state.membership.enroll(session.connection_id()).await;

        let events = self
            .state
            .bus
            .subscribe_to_room(session.room_key().as_str())
            .await;

        if let Err(e) = session.join().await {
            self.state
                .membership
                .unenroll(session.connection_id())
                .await;
            return Err(e);
        }

        Ok(ConnectedPeer { session, events })
    }

    /// Tears a peer down the way a closed socket does
    pub async fn disconnect(&self, peer: &mut ConnectedPeer) {
        peer.session.leave().await;
        self.state
            .membership
            .unenroll(peer.session.connection_id())
            .await;
        // No-op while the peer still holds its event receiver; the channel
        // stays readable for assertions
        self.state
            .bus
            .release_room(peer.session.room_key().as_str())
            .await;
    }

    /// Fetches the shared record behind a raw token, hashing it the same
    /// way admission does
    pub async fn record_for(&self, token: &str) -> Option<RoomRecord> {
        let room_key = self.state.hasher.hash(token);
        self.state
            .store
            .fetch_room(&room_key)
            .await
            .expect("store should be reachable")
    }

    /// Waiting-room keys as GET /active reports them
    pub async fn waiting_rooms(&self) -> Vec<String> {
        self.state
            .membership
            .waiting_rooms()
            .await
            .into_iter()
            .collect()
    }
}
