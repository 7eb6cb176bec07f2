use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::event::{EventFanout, RoomBus, RoomEvent};
use crate::room::activity_tracker::ActivityTracker;
use crate::room::hasher::RoomKey;
use crate::room::models::RoomRecord;
use crate::room::store::{JoinOutcome, LeaveOutcome, PresenceStore};
use crate::shared::{AppError, AppState};
use crate::websockets::membership::MembershipIndex;
use crate::websockets::messages::{MessageType, WsMessage};

/// Lifecycle of one participant's tenure in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Admitted but not yet recorded in the room
    Joining,
    /// Recorded in the room's participants; relay traffic flows
    Active,
    /// Terminal: removed from the room, whether by clean leave or drop
    Left,
}

/// Owns a single connection's membership in a single room
///
/// The session joins the connection into the shared record, relays its
/// signals to the peer, and guarantees the record is updated when the
/// connection goes away. The `record` field is an advisory snapshot taken
/// from the last store outcome; the store stays authoritative.
pub struct RoomSession {
    connection_id: String,
    room_key: RoomKey,
    record: RoomRecord,
    state: SessionState,
    store: Arc<dyn PresenceStore>,
    bus: RoomBus,
    fanout: Arc<dyn EventFanout>,
    membership: Arc<MembershipIndex>,
    activity: Arc<ActivityTracker>,
}

impl RoomSession {
    pub fn new(
        connection_id: String,
        room_key: RoomKey,
        record: RoomRecord,
        state: &AppState,
    ) -> Self {
        Self {
            connection_id,
            room_key,
            record,
            state: SessionState::Joining,
            store: Arc::clone(&state.store),
            bus: state.bus.clone(),
            fanout: Arc::clone(&state.fanout),
            membership: Arc::clone(&state.membership),
            activity: Arc::clone(&state.activity),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn room_key(&self) -> &RoomKey {
        &self.room_key
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn record(&self) -> &RoomRecord {
        &self.record
    }

    /// Joining -> Active. Atomically appends this connection to the room,
    /// creating it on first join. A full room rejects the join and the
    /// session never activates.
    #[instrument(skip(self), fields(connection_id = %self.connection_id, room_key = %self.room_key))]
    pub async fn join(&mut self) -> Result<(), AppError> {
        match self
            .store
            .join_room(&self.room_key, &self.connection_id)
            .await?
        {
            JoinOutcome::Joined(record) => {
                info!(
                    participant_count = record.participant_count(),
                    "Session joined room"
                );
                self.record = record;
            }
            JoinOutcome::AlreadyJoined(record) => {
                debug!("Session already present in room");
                self.record = record;
            }
            JoinOutcome::RoomFull(record) => {
                info!("Room already paired, rejecting session");
                self.record = record;
                return Err(AppError::RoomFull);
            }
        }

        self.state = SessionState::Active;
        self.membership
            .join(self.room_key.as_str(), &self.connection_id)
            .await;
        self.emit(RoomEvent::PeerJoined {
            peer: self.connection_id.clone(),
            participants: self.record.participants.clone(),
        })
        .await;

        Ok(())
    }

    /// -> Left. Removes this connection from the shared record; the
    /// emptied record, if any, stays for the reaper. Store failures are
    /// logged and swallowed - this runs on every disconnect path and the
    /// reaper reclaims whatever a failed leave left behind.
    #[instrument(skip(self), fields(connection_id = %self.connection_id, room_key = %self.room_key))]
    pub async fn leave(&mut self) {
        if self.state != SessionState::Active {
            self.state = SessionState::Left;
            return;
        }
        self.state = SessionState::Left;

        let outcome = self
            .store
            .leave_room(&self.room_key, &self.connection_id)
            .await;
        self.membership
            .leave(self.room_key.as_str(), &self.connection_id)
            .await;

        match outcome {
            Ok(LeaveOutcome::Left(record)) => {
                info!(
                    participant_count = record.participant_count(),
                    "Session left room"
                );
                self.record = record.clone();
                self.emit(RoomEvent::PeerLeft {
                    peer: self.connection_id.clone(),
                    participants: record.participants,
                })
                .await;
            }
            Ok(LeaveOutcome::NotInRoom) | Ok(LeaveOutcome::RoomNotFound) => {
                debug!("No room membership left to clean up");
            }
            Err(e) => {
                warn!(error = %e, "Store unreachable during leave, reaper will reclaim");
            }
        }
    }

    /// Relays an opaque signaling payload to the rest of the room. Only
    /// Active sessions relay. Traffic refreshes the room's activity
    /// timestamp so the reaper sees a live room.
    pub async fn relay_signal(&self, payload: Value) {
        if self.state != SessionState::Active {
            debug!(
                connection_id = %self.connection_id,
                state = ?self.state,
                "Dropping signal from non-active session"
            );
            return;
        }

        // Relay keeps flowing during a store blip; the timestamp catches
        // up on the next message
        if let Err(e) = self.activity.record_activity(&self.room_key).await {
            warn!(room_key = %self.room_key, error = %e, "Failed to record room activity");
        }

        self.emit(RoomEvent::Signal {
            from: self.connection_id.clone(),
            payload,
        })
        .await;
    }

    /// Handles one inbound client frame
    pub async fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<WsMessage>(text) {
            Ok(message) => match message.message_type {
                MessageType::Signal => self.relay_signal(message.payload).await,
                other => {
                    debug!(
                        connection_id = %self.connection_id,
                        message_type = ?other,
                        "Ignoring unexpected client frame"
                    );
                }
            },
            Err(e) => {
                warn!(
                    connection_id = %self.connection_id,
                    error = %e,
                    "Failed to parse client frame"
                );
            }
        }
    }

    /// Converts a room event into the frame this client should receive.
    /// None when the client originated the payload itself.
    pub fn frame_for(&self, event: &RoomEvent) -> Option<String> {
        let message = match event {
            RoomEvent::PeerJoined { peer, participants } => {
                WsMessage::peer_joined(peer.clone(), participants.clone())
            }
            RoomEvent::PeerLeft { peer, participants } => {
                WsMessage::peer_left(peer.clone(), participants.clone())
            }
            RoomEvent::Signal { from, payload } if from != &self.connection_id => {
                WsMessage::signal(from.clone(), payload.clone())
            }
            // No echo of a participant's own payloads
            RoomEvent::Signal { .. } => return None,
            // Store housekeeping, nothing for the client
            RoomEvent::RoomReaped => return None,
        };

        match serde_json::to_string(&message) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(error = %e, "Failed to serialize outbound frame");
                None
            }
        }
    }

    /// Local delivery first, then the cross-process mirror.
    async fn emit(&self, event: RoomEvent) {
        self.bus
            .emit_to_room(self.room_key.as_str(), event.clone())
            .await;
        self.fanout.publish(self.room_key.as_str(), &event).await;
    }
}
