use async_trait::async_trait;

use pairwire::room::{JoinOutcome, LeaveOutcome, PresenceStore, RoomKey, RoomRecord};
use pairwire::shared::AppError;

// ============================================================================
// Mock Infrastructure
// ============================================================================

fn unavailable() -> AppError {
    AppError::StoreUnavailable("store offline".to_string())
}

/// Store that fails every call - drives the fail-closed admission path
pub struct FailingPresenceStore;

#[async_trait]
impl PresenceStore for FailingPresenceStore {
    async fn fetch_room(&self, _room_key: &RoomKey) -> Result<Option<RoomRecord>, AppError> {
        Err(unavailable())
    }

    async fn join_room(
        &self,
        _room_key: &RoomKey,
        _connection_id: &str,
    ) -> Result<JoinOutcome, AppError> {
        Err(unavailable())
    }

    async fn leave_room(
        &self,
        _room_key: &RoomKey,
        _connection_id: &str,
    ) -> Result<LeaveOutcome, AppError> {
        Err(unavailable())
    }

    async fn touch_room(&self, _room_key: &RoomKey) -> Result<bool, AppError> {
        Err(unavailable())
    }

    async fn list_rooms(&self) -> Result<Vec<(RoomKey, String)>, AppError> {
        Err(unavailable())
    }

    async fn remove_room_if(
        &self,
        _room_key: &RoomKey,
        _expected_raw: &str,
    ) -> Result<bool, AppError> {
        Err(unavailable())
    }
}
