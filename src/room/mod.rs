// Public API - what other modules can use
pub use handlers::active_rooms;
pub use hasher::{RoomHasher, RoomKey};
pub use models::{RoomRecord, ROOM_CAPACITY};
pub use store::{InMemoryPresenceStore, JoinOutcome, LeaveOutcome, PresenceStore};

// Internal modules
pub mod activity_tracker;
mod handlers;
pub mod hasher;
pub mod models;
pub mod reaper;
pub mod redis_store;
pub mod scanner;
pub mod store;
