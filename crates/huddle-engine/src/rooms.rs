//! Room state: an ordered participant list plus the peer↔connection
//! bijection, kept honest by a pruning pass.
//!
//! The two maps are never exposed individually; every mutation goes through
//! methods that keep "for every forward entry there is a matching inverse
//! entry" true, and [`Room::prune`] re-establishes it after transport races.

use std::collections::{HashMap, HashSet};

use crate::connection::ConnectionId;

#[derive(Debug, Default)]
pub(crate) struct Room {
    /// Peer ids in join order, no duplicates.
    pub participants: Vec<String>,
    pub peer_to_connection: HashMap<String, ConnectionId>,
    pub connection_to_peer: HashMap<ConnectionId, String>,
}

impl Room {
    /// Bind a peer id to a connection, appending to the participant list on
    /// first sight. Re-inserting an existing pair is a no-op.
    pub fn insert(&mut self, peer_id: String, conn: ConnectionId) {
        if !self.participants.iter().any(|p| p == &peer_id) {
            self.participants.push(peer_id.clone());
        }
        self.peer_to_connection.insert(peer_id.clone(), conn);
        self.connection_to_peer.insert(conn, peer_id);
    }

    /// Remove a peer and its mappings. Returns the connection it was bound to.
    pub fn remove_peer(&mut self, peer_id: &str) -> Option<ConnectionId> {
        let conn = self.peer_to_connection.remove(peer_id);
        if let Some(c) = conn {
            if self.connection_to_peer.get(&c).is_some_and(|p| p == peer_id) {
                self.connection_to_peer.remove(&c);
            }
        }
        self.participants.retain(|p| p != peer_id);
        conn
    }

    /// Remove whatever peer a connection is bound to. Returns the peer id.
    pub fn remove_connection(&mut self, conn: ConnectionId) -> Option<String> {
        let peer = self.connection_to_peer.remove(&conn)?;
        if self.peer_to_connection.get(&peer) == Some(&conn) {
            self.peer_to_connection.remove(&peer);
        }
        self.participants.retain(|p| p != &peer);
        Some(peer)
    }

    /// Drop entries whose connection is dead or whose inverse does not hold,
    /// then rebuild the participant list from what survived.
    pub fn prune(&mut self, live: impl Fn(ConnectionId) -> bool) {
        let inverse = &self.connection_to_peer;
        self.peer_to_connection
            .retain(|peer, conn| live(*conn) && inverse.get(conn).is_some_and(|p| p == peer));

        let forward = &self.peer_to_connection;
        self.connection_to_peer
            .retain(|conn, peer| forward.get(peer).is_some_and(|c| c == conn));

        let mut seen = HashSet::new();
        let forward = &self.peer_to_connection;
        self.participants
            .retain(|p| forward.contains_key(p) && seen.insert(p.clone()));
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
