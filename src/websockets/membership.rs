use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

use crate::room::scanner;

/// Live room membership as seen by this process
///
/// Tracks which connection ids sit in which rooms: local connections
/// directly, remote ones as best-effort mirrors fed by the fan-out. The
/// presence store stays authoritative; this index only serves the
/// waiting-room scan, which tolerates slightly stale membership.
///
/// Every local connection is also enrolled in a self-room named after its
/// own connection id, matching the transport convention the rest of the
/// deployment expects. The scanner filters those out via the known
/// connection-id set.
#[derive(Debug, Default)]
pub struct MembershipIndex {
    /// room name -> connection ids inside it (self-rooms included)
    rooms: RwLock<HashMap<String, HashSet<String>>>,
    /// Connection ids enrolled on this process - the scanner's exclusion set
    local_connections: RwLock<HashSet<String>>,
}

impl MembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a local connection and its self-room.
    pub async fn enroll(&self, connection_id: &str) {
        debug!(connection_id = %connection_id, "Enrolling connection");
        self.local_connections
            .write()
            .await
            .insert(connection_id.to_string());
        self.rooms
            .write()
            .await
            .entry(connection_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
    }

    /// Adds a connection to a room.
    pub async fn join(&self, room_key: &str, connection_id: &str) {
        self.rooms
            .write()
            .await
            .entry(room_key.to_string())
            .or_default()
            .insert(connection_id.to_string());
    }

    /// Removes a connection from a room, dropping the room entry once its
    /// last member is gone.
    pub async fn leave(&self, room_key: &str, connection_id: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room_key) {
            members.remove(connection_id);
            if members.is_empty() {
                rooms.remove(room_key);
            }
        }
    }

    /// Drops a local connection entirely: its self-room and every room
    /// membership it still holds.
    pub async fn unenroll(&self, connection_id: &str) {
        debug!(connection_id = %connection_id, "Unenrolling connection");
        self.local_connections.write().await.remove(connection_id);

        let mut rooms = self.rooms.write().await;
        rooms.remove(connection_id); // self-room
        rooms.retain(|_, members| {
            members.remove(connection_id);
            !members.is_empty()
        });
    }

    /// Fan-out mirror: a peer process reported a join.
    pub async fn apply_remote_join(&self, room_key: &str, connection_id: &str) {
        self.join(room_key, connection_id).await;
    }

    /// Fan-out mirror: a peer process reported a leave.
    pub async fn apply_remote_leave(&self, room_key: &str, connection_id: &str) {
        self.leave(room_key, connection_id).await;
    }

    /// A room's record was reaped, locally or on a peer process. Drops the
    /// room's remote mirror members; a process that died without publishing
    /// its leaves is cleared here. Local members are live connections and
    /// stay until their own disconnect.
    pub async fn apply_room_reaped(&self, room_key: &str) {
        let locals = self.local_connections.read().await.clone();
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room_key) {
            members.retain(|id| locals.contains(id));
            if members.is_empty() {
                debug!(room_key = %room_key, "Dropped reaped room from membership index");
                rooms.remove(room_key);
            }
        }
    }

    /// Point-in-time copy of the membership map. Callers iterate the copy
    /// while connections keep churning underneath; a scan result may be
    /// stale by the time it is read, never torn.
    pub async fn snapshot(&self) -> HashMap<String, HashSet<String>> {
        self.rooms.read().await.clone()
    }

    /// Connection ids enrolled on this process.
    pub async fn connection_ids(&self) -> HashSet<String> {
        self.local_connections.read().await.clone()
    }

    /// Rooms currently waiting on a second participant.
    pub async fn waiting_rooms(&self) -> BTreeSet<String> {
        let snapshot = self.snapshot().await;
        let exclusions = self.connection_ids().await;
        scanner::waiting_rooms(&snapshot, &exclusions)
    }
}
