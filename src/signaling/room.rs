//! Room membership as seen from this peer

use std::collections::HashSet;

/// Created on a successful join, owned by the session controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSession {
    pub room_id: String,
    pub local_peer_id: Option<String>,
    remote_peer_ids: HashSet<String>,
}

impl RoomSession {
    pub fn new(room_id: impl Into<String>, local_peer_id: Option<String>) -> Self {
        Self {
            room_id: room_id.into(),
            local_peer_id,
            remote_peer_ids: HashSet::new(),
        }
    }

    pub fn is_local(&self, peer_id: &str) -> bool {
        self.local_peer_id.as_deref() == Some(peer_id)
    }

    /// Record a joined peer. Returns false for ourselves or a repeat.
    pub fn peer_joined(&mut self, peer_id: &str) -> bool {
        if self.is_local(peer_id) {
            return false;
        }
        self.remote_peer_ids.insert(peer_id.to_string())
    }

    /// Forget a peer. Returns false if it was not known.
    pub fn peer_left(&mut self, peer_id: &str) -> bool {
        self.remote_peer_ids.remove(peer_id)
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.remote_peer_ids.contains(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.remote_peer_ids.len()
    }

    /// Remote peers in stable order
    pub fn remote_peers(&self) -> Vec<&str> {
        let mut peers: Vec<&str> = self.remote_peer_ids.iter().map(String::as_str).collect();
        peers.sort_unstable();
        peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_membership() {
        let mut room = RoomSession::new("test-room", Some("me".to_string()));
        assert!(room.peer_joined("b"));
        assert!(room.peer_joined("a"));
        assert!(!room.peer_joined("a"));
        assert!(!room.peer_joined("me"));
        assert_eq!(room.remote_peers(), vec!["a", "b"]);

        assert!(room.peer_left("a"));
        assert!(!room.peer_left("a"));
        assert_eq!(room.peer_count(), 1);
        assert!(room.contains("b"));
    }
}
