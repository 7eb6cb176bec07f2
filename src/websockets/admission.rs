use tracing::debug;
use uuid::Uuid;

use crate::shared::{AppError, AppState};
use crate::websockets::session::RoomSession;

/// Admits one incoming realtime connection.
///
/// Validates the handshake's room token, resolves it to a room key, and
/// snapshots the room's current record - a plain read, so rooms nobody
/// ever joins are never created. The returned session is in `Joining`
/// state with a fresh connection id; nothing has been written yet.
///
/// Fails closed: an unreachable store rejects the connection instead of
/// admitting it blind.
pub async fn admit(state: &AppState, room_token: Option<&str>) -> Result<RoomSession, AppError> {
    let token = room_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::InvalidRoomToken)?;

    let room_key = state.hasher.hash(token);
    // Only the hashed key is logged; the raw token never reaches the logs
    debug!(room_key = %room_key, "Admitting connection");

    let record = state.store.fetch_room(&room_key).await?.unwrap_or_default();
    let connection_id = Uuid::new_v4().to_string();

    Ok(RoomSession::new(connection_id, room_key, record, state))
}
