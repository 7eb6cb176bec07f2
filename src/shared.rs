use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::config::HeartbeatConfig;
use crate::event::{EventFanout, RoomBus};
use crate::room::activity_tracker::ActivityTracker;
use crate::room::hasher::RoomHasher;
use crate::room::store::PresenceStore;
use crate::websockets::membership::MembershipIndex;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PresenceStore>,
    pub hasher: Arc<RoomHasher>,
    pub bus: RoomBus,
    pub fanout: Arc<dyn EventFanout>,
    pub membership: Arc<MembershipIndex>,
    pub activity: Arc<ActivityTracker>,
    pub heartbeat: HeartbeatConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PresenceStore>,
        hasher: Arc<RoomHasher>,
        bus: RoomBus,
        fanout: Arc<dyn EventFanout>,
        membership: Arc<MembershipIndex>,
        heartbeat: HeartbeatConfig,
    ) -> Self {
        let activity = Arc::new(ActivityTracker::new(Arc::clone(&store)));
        Self {
            store,
            hasher,
            bus,
            fanout,
            membership,
            activity,
            heartbeat,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    /// The handshake carried no usable room token
    #[error("Invalid room token")]
    InvalidRoomToken,

    #[error("Room is full")]
    RoomFull,

    #[error("Presence store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal server error")]
    Internal,
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::StoreUnavailable(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidRoomToken => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::RoomFull => (StatusCode::CONFLICT, self.to_string()),
            // Admission fails closed: an unreachable store rejects the
            // connection rather than admitting blind.
            AppError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::Serialization(_) | AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
