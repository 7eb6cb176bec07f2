use std::collections::{BTreeSet, HashMap, HashSet};

/// Scans a membership snapshot for rooms waiting on a second participant.
///
/// `membership` maps room names to the connection ids inside them, and
/// includes the transport's per-connection self-rooms. `exclusions` is the
/// set of known connection ids, which is exactly the set of self-room
/// names: a room is only counted when its name is not a connection id.
/// Without the exclusion every connection would be reported as a waiting
/// room of one.
///
/// Returned keys are sorted so repeated scans over the same state read
/// identically.
pub fn waiting_rooms(
    membership: &HashMap<String, HashSet<String>>,
    exclusions: &HashSet<String>,
) -> BTreeSet<String> {
    membership
        .iter()
        .filter(|(room, _)| !exclusions.contains(*room))
        .filter(|(_, members)| members.len() == 1)
        .map(|(room, _)| room.clone())
        .collect()
}
