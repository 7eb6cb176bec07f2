use std::sync::Arc;
use tokio::sync::broadcast;

use pairwire::{
    config::HeartbeatConfig,
    event::{LocalFanout, RoomBus, RoomEvent},
    room::{InMemoryPresenceStore, PresenceStore, RoomHasher},
    shared::AppState,
    websockets::{MembershipIndex, RoomSession},
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub state: AppState,
}

/// One admitted and joined participant, with its room event subscription
pub struct ConnectedPeer {
    pub session: RoomSession,
    pub events: broadcast::Receiver<RoomEvent>,
}

impl ConnectedPeer {
    pub fn id(&self) -> String {
        self.session.connection_id().to_string()
    }

    /// Discards everything buffered so far
    pub fn drain_events(&mut self) {
        while self.events.try_recv().is_ok() {}
    }
}

pub struct TestSetupBuilder {
    hasher: RoomHasher,
    store: Option<Arc<dyn PresenceStore>>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            // Unkeyed hashing, so tests exercise the real token -> key mapping
            hasher: RoomHasher::new(None, false),
            store: None,
        }
    }

    pub fn with_passthrough_hashing(mut self) -> Self {
        self.hasher = RoomHasher::new(None, true);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PresenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> TestSetup {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryPresenceStore::new()));

        let state = AppState::new(
            store,
            Arc::new(self.hasher),
            RoomBus::new(),
            Arc::new(LocalFanout),
            Arc::new(MembershipIndex::new()),
            HeartbeatConfig::default(),
        );

        TestSetup { state }
    }
}
