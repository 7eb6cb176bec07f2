// Library crate for the pairwire presence server
// This file exposes the public API for integration tests

pub mod config;
pub mod event;
pub mod room;
pub mod shared;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use event::{RoomBus, RoomEvent};
pub use room::{PresenceStore, RoomHasher, RoomKey, RoomRecord};
pub use shared::{AppError, AppState};
pub use websockets::{websocket_handler, MembershipIndex, RoomSession, SessionState, WsMessage};
