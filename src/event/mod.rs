// Event distribution infrastructure
//
// Room events flow through a local per-room bus and, when a deployment
// runs more than one process, a Redis pub/sub fan-out that mirrors them
// to the peers.

// Public API - what other modules can use
pub use bus::RoomBus;
pub use events::RoomEvent;
pub use fanout::{Envelope, EventFanout, LocalFanout, RedisFanout};

// Internal modules
mod bus;
mod events;
pub mod fanout;
