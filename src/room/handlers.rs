use axum::{extract::State, Json};
use tracing::{info, instrument};

use crate::shared::{AppError, AppState};

/// HTTP handler for listing rooms waiting on a second participant
///
/// GET /active
/// Returns a sorted array of hashed room keys with exactly one member,
/// as seen by this process's membership index. Raw room tokens never
/// appear here.
#[instrument(name = "active_rooms", skip(state))]
pub async fn active_rooms(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    let waiting: Vec<String> = state.membership.waiting_rooms().await.into_iter().collect();

    info!(waiting_count = waiting.len(), "Listed waiting rooms");

    Ok(Json(waiting))
}
