use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::shared::{AppError, AppState};
use crate::websockets::admission::admit;
use crate::websockets::messages::WsMessage;
use crate::websockets::session::RoomSession;
use crate::websockets::socket::{Connection, SocketWrapper};

/// Handshake query parameters for the realtime endpoint
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "roomId")]
    pub room_id: Option<String>,
}

/// WebSocket endpoint pairing a visitor into a room
///
/// GET /ws?roomId=<token>
/// Admission runs before the upgrade, so a bad token or an unreachable
/// store rejects the plain HTTP request instead of a live socket.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(app_state): State<AppState>,
) -> Result<Response, AppError> {
    let session = admit(&app_state, query.room_id.as_deref()).await?;

    info!(
        connection_id = %session.connection_id(),
        room_key = %session.room_key(),
        "WebSocket connection admitted"
    );

    Ok(ws.on_upgrade(move |socket| handle_websocket_connection(socket, session, app_state)))
}

/// Handle the upgraded WebSocket connection
async fn handle_websocket_connection(
    socket: axum::extract::ws::WebSocket,
    mut session: RoomSession,
    app_state: AppState,
) {
    let connection_id = session.connection_id().to_string();
    let room_key = session.room_key().clone();

    info!(
        connection_id = %connection_id,
        room_key = %room_key,
        "WebSocket connection established"
    );

    let mut socket: Box<dyn SocketWrapper> = Box::new(socket);

    // Enroll the transport-level connection (and its self-room) before the
    // room join, so the waiting-room scan always knows this id
    app_state.membership.enroll(&connection_id).await;

    // Subscribe before joining: the session's own PEER_JOINED doubles as
    // the roster acknowledgement and must not be missed
    let events = app_state.bus.subscribe_to_room(room_key.as_str()).await;

    if let Err(e) = session.join().await {
        match e {
            AppError::RoomFull => {
                info!(
                    connection_id = %connection_id,
                    room_key = %room_key,
                    "Room already paired, turning connection away"
                );
                send_and_close(&mut socket, WsMessage::room_full()).await;
            }
            e => {
                warn!(
                    connection_id = %connection_id,
                    room_key = %room_key,
                    error = %e,
                    "Join failed"
                );
                send_and_close(&mut socket, WsMessage::error("Could not join room".to_string()))
                    .await;
            }
        }
        // The subscription must be gone before release_room can collect
        // the channel
        drop(events);
        app_state.membership.unenroll(&connection_id).await;
        app_state.bus.release_room(room_key.as_str()).await;
        return;
    }

    // Run the connection until disconnect; the session leaves its room on
    // every exit path inside run
    let connection = Connection::new(socket, session, events, app_state.heartbeat);
    match connection.run().await {
        Ok(()) => {
            info!(
                connection_id = %connection_id,
                room_key = %room_key,
                "WebSocket connection closed cleanly"
            );
        }
        Err(e) => {
            warn!(
                connection_id = %connection_id,
                room_key = %room_key,
                error = ?e,
                "WebSocket connection error"
            );
        }
    }

    app_state.membership.unenroll(&connection_id).await;
    // The run loop consumed the event subscription, so the room channel
    // can go once no other local connection holds it
    app_state.bus.release_room(room_key.as_str()).await;
}

async fn send_and_close(socket: &mut Box<dyn SocketWrapper>, message: WsMessage) {
    if let Ok(frame) = serde_json::to_string(&message) {
        let _ = socket.send_message(frame).await;
    }
    let _ = socket.close().await;
}
