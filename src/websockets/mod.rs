// Public API
pub use admission::admit;
pub use handler::websocket_handler;
pub use membership::MembershipIndex;
pub use messages::{MessageType, WsMessage};
pub use session::{RoomSession, SessionState};
pub use socket::{Connection, SocketWrapper};

// Internal modules
mod admission;
mod handler;
pub mod membership;
mod messages;
mod session;
mod socket;
