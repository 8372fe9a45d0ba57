//! The engine: exclusive owner of the room, host and session registries.
//!
//! Handlers run to completion synchronously; outbound events are pushed onto
//! per-connection channels so fanout never blocks a handler. Anything with a
//! deadline is reported back to the caller as an [`Expiry`] so the async
//! layer can schedule the timer outside the lock.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use huddle_protocol::events::{ClientEvent, ServerEvent};
use huddle_protocol::sanitize::is_uuid_like;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::connection::{Connection, ConnectionId};
use crate::remote::{HostClaim, HostEntry, PendingRequest, PendingSetup, Session, SetupAssignment};
use crate::rooms::Room;

/// Consent window for pending remote-control requests.
pub const REQUEST_TTL: Duration = Duration::from_secs(45);
/// Consent window for pending host-setup requests.
pub const SETUP_TTL: Duration = Duration::from_secs(45);
/// Lifetime of a host-setup assignment.
pub const ASSIGNMENT_TTL: Duration = Duration::from_secs(15 * 60);

/// Engine behavior toggles, resolved from the environment by the server.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Auto-create UUID-shaped rooms on `joined-room`.
    pub auto_create_rooms: bool,
    /// Disable the same-network self-host block.
    pub allow_same_machine: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { auto_create_rooms: true, allow_same_machine: false }
    }
}

/// A deadline the async layer must arm after a handler returns.
///
/// Firing funnels into the matching `expire_*` method, which is a no-op when
/// the record is already gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expiry {
    PendingRequest { request_id: String },
    PendingSetup { request_id: String },
    Assignment { host_id: String },
}

impl Expiry {
    pub fn delay(&self) -> Duration {
        match self {
            Self::PendingRequest { .. } => REQUEST_TTL,
            Self::PendingSetup { .. } => SETUP_TTL,
            Self::Assignment { .. } => ASSIGNMENT_TTL,
        }
    }
}

/// Relay counters for one active session, for the debug traffic reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTraffic {
    pub session_id: String,
    pub host_id: String,
    pub frames_relayed: u64,
    pub inputs_relayed: u64,
}

/// The coordination engine. All registries are process-local; nothing here
/// survives a restart.
pub struct Engine {
    pub(crate) config: EngineConfig,
    next_conn: u64,
    pub(crate) connections: HashMap<ConnectionId, Connection>,
    /// Transport-level room membership: which sockets have joined a room,
    /// independent of whether they announced a peer id yet.
    pub(crate) adapter: HashMap<String, HashSet<ConnectionId>>,
    pub(crate) rooms: HashMap<String, Room>,
    /// BTreeMap keeps the hosts list sorted by host id.
    pub(crate) hosts: BTreeMap<String, HostEntry>,
    pub(crate) claims: HashMap<String, HostClaim>,
    pub(crate) assignments: HashMap<String, SetupAssignment>,
    pub(crate) pending_requests: HashMap<String, PendingRequest>,
    pub(crate) pending_setups: HashMap<String, PendingSetup>,
    pub(crate) sessions: HashMap<String, Session>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            next_conn: 0,
            connections: HashMap::new(),
            adapter: HashMap::new(),
            rooms: HashMap::new(),
            hosts: BTreeMap::new(),
            claims: HashMap::new(),
            assignments: HashMap::new(),
            pending_requests: HashMap::new(),
            pending_setups: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    /// Register a freshly accepted connection and return its id.
    pub fn connect(
        &mut self,
        network_id: String,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> ConnectionId {
        self.next_conn += 1;
        let id = ConnectionId(self.next_conn);
        debug!(conn = %id, network = %network_id, "connection registered");
        self.connections.insert(id, Connection::new(network_id, sender));
        id
    }

    /// Route one inbound event. Returns the deadlines to arm.
    pub fn dispatch(&mut self, conn: ConnectionId, event: ClientEvent) -> Vec<Expiry> {
        if !self.connections.contains_key(&conn) {
            return Vec::new();
        }
        match event {
            ClientEvent::CreateRoom => self.create_room(conn),
            ClientEvent::JoinedRoom { room_id, peer_id } => self.joined_room(conn, room_id, peer_id),
            ClientEvent::Ready => self.ready(conn),
            ClientEvent::LeaveRoom => self.leave_room_event(conn),
            ClientEvent::HostRegister { host_id } => self.host_register(conn, host_id),
            ClientEvent::HostClaim { host_id } => self.host_claim(conn, host_id),
            ClientEvent::HostsRequest => self.hosts_request(conn),
            ClientEvent::HostSetupRequest { target_peer_id } => {
                return self.host_setup_request(conn, target_peer_id).into_iter().collect();
            }
            ClientEvent::HostSetupDecision { request_id, accepted } => {
                return self.host_setup_decision(conn, &request_id, accepted).into_iter().collect();
            }
            ClientEvent::SessionRequest { host_id } => {
                return self.session_request(conn, host_id).into_iter().collect();
            }
            ClientEvent::SessionDecision { request_id, accepted, reason } => {
                self.session_decision(conn, &request_id, accepted, reason);
            }
            ClientEvent::SessionStop { session_id } => self.session_stop(conn, session_id),
            ClientEvent::HostFrame { session_id, image, width, height, timestamp } => {
                self.host_frame(conn, &session_id, image, width, height, timestamp);
            }
            ClientEvent::RemoteInput { session_id, event } => {
                self.remote_input(conn, &session_id, &event);
            }
        }
        Vec::new()
    }

    // ------------------------------------------------------------------
    // Fanout primitives
    // ------------------------------------------------------------------

    pub(crate) fn emit(&self, conn: ConnectionId, event: ServerEvent) {
        if let Some(c) = self.connections.get(&conn) {
            c.send(event);
        }
    }

    pub(crate) fn emit_to_room(
        &self,
        room_id: &str,
        event: ServerEvent,
        except: Option<ConnectionId>,
    ) {
        let Some(members) = self.adapter.get(room_id) else { return };
        for member in members {
            if Some(*member) == except {
                continue;
            }
            self.emit(*member, event.clone());
        }
    }

    /// Push one event to every live connection.
    pub fn broadcast(&self, event: ServerEvent) {
        for c in self.connections.values() {
            c.send(event.clone());
        }
    }

    fn transport_join(&mut self, conn: ConnectionId, room_id: &str) {
        self.adapter.entry(room_id.to_string()).or_default().insert(conn);
    }

    fn transport_leave(&mut self, conn: ConnectionId, room_id: &str) {
        if let Some(members) = self.adapter.get_mut(room_id) {
            members.remove(&conn);
            if members.is_empty() {
                self.adapter.remove(room_id);
            }
        }
    }

    pub(crate) fn conn_room(&self, conn: ConnectionId) -> Option<String> {
        self.connections.get(&conn).and_then(|c| c.room_id.clone())
    }

    pub(crate) fn conn_peer(&self, conn: ConnectionId) -> Option<String> {
        self.connections.get(&conn).and_then(|c| c.peer_id.clone())
    }

    // ------------------------------------------------------------------
    // Room engine
    // ------------------------------------------------------------------

    fn create_room(&mut self, conn: ConnectionId) {
        let room_id = Uuid::new_v4().to_string();
        self.rooms.insert(room_id.clone(), Room::default());
        self.transport_join(conn, &room_id);
        if let Some(c) = self.connections.get_mut(&conn) {
            c.room_id = Some(room_id.clone());
        }
        info!(conn = %conn, room = %room_id, "room created");
        self.emit(conn, ServerEvent::RoomCreated { room_id });
    }

    fn joined_room(&mut self, conn: ConnectionId, room_id: String, peer_id: String) {
        if room_id.is_empty() || peer_id.is_empty() {
            return;
        }
        if !self.rooms.contains_key(&room_id) {
            if self.config.auto_create_rooms && is_uuid_like(&room_id) {
                debug!(room = %room_id, "auto-creating room on join");
                self.rooms.insert(room_id.clone(), Room::default());
            } else {
                self.emit(conn, ServerEvent::RoomNotFound { room_id });
                return;
            }
        }

        self.transport_join(conn, &room_id);
        self.prune_room(&room_id);

        // A connection re-announcing itself under a new identity vacates the
        // old one first.
        let previous = self
            .connections
            .get(&conn)
            .and_then(|c| Some((c.room_id.clone()?, c.peer_id.clone()?)));
        if let Some((old_room, old_peer)) = previous {
            if old_room != room_id || old_peer != peer_id {
                self.remove_from_room(conn, &old_room);
                if old_room != room_id {
                    self.transport_leave(conn, &old_room);
                    self.prune_room(&old_room);
                }
            }
        }

        // The same peer id arriving on a new connection evicts the old one.
        let stale = self.rooms.get(&room_id).and_then(|r| {
            r.peer_to_connection
                .get(&peer_id)
                .copied()
                .filter(|old| *old != conn && self.connections.contains_key(old))
        });
        if let Some(old_conn) = stale {
            if let Some(room) = self.rooms.get_mut(&room_id) {
                room.remove_peer(&peer_id);
            }
            self.emit_to_room(&room_id, ServerEvent::UserLeft { peer_id: peer_id.clone() }, None);
            self.transport_leave(old_conn, &room_id);
            if let Some(old) = self.connections.get_mut(&old_conn) {
                old.room_id = None;
                old.peer_id = None;
            }
            debug!(conn = %old_conn, room = %room_id, peer = %peer_id, "evicted stale peer mapping");
        }

        let participants = {
            let Some(room) = self.rooms.get_mut(&room_id) else { return };
            room.insert(peer_id.clone(), conn);
            room.participants.clone()
        };
        if let Some(c) = self.connections.get_mut(&conn) {
            c.room_id = Some(room_id.clone());
            c.peer_id = Some(peer_id.clone());
        }
        info!(conn = %conn, room = %room_id, peer = %peer_id, "peer joined room");
        self.emit(conn, ServerEvent::GetUsers { room_id, participants });
    }

    fn ready(&mut self, conn: ConnectionId) {
        let (Some(room_id), Some(peer_id)) = (self.conn_room(conn), self.conn_peer(conn)) else {
            return;
        };
        self.prune_room(&room_id);
        let consistent = self
            .rooms
            .get(&room_id)
            .is_some_and(|r| r.connection_to_peer.get(&conn).is_some_and(|p| *p == peer_id));
        if consistent {
            self.emit_to_room(&room_id, ServerEvent::UserJoined { peer_id }, Some(conn));
        }
    }

    /// Remove a connection's peer from a room, notifying the others.
    fn remove_from_room(&mut self, conn: ConnectionId, room_id: &str) {
        let removed = self.rooms.get_mut(room_id).and_then(|r| r.remove_connection(conn));
        if let Some(peer_id) = removed {
            self.emit_to_room(room_id, ServerEvent::UserLeft { peer_id }, Some(conn));
        }
    }

    /// The room engine's leave path, shared by `leave-room` and disconnect.
    pub(crate) fn room_leave(&mut self, conn: ConnectionId) {
        let Some(room_id) = self.conn_room(conn) else { return };
        self.remove_from_room(conn, &room_id);
        self.transport_leave(conn, &room_id);
        if let Some(c) = self.connections.get_mut(&conn) {
            c.room_id = None;
            c.peer_id = None;
        }
        self.prune_room(&room_id);
    }

    fn leave_room_event(&mut self, conn: ConnectionId) {
        self.teardown_claims_and_setups(conn);
        self.room_leave(conn);
    }

    /// Re-establish the bijection invariant and delete the room once both the
    /// participant list and the transport-level membership are empty. The
    /// conjunction protects a just-created room whose creator has joined at
    /// the transport level but not announced a peer id yet.
    pub(crate) fn prune_room(&mut self, room_id: &str) {
        let connections = &self.connections;
        let Some(room) = self.rooms.get_mut(room_id) else { return };
        room.prune(|c| connections.contains_key(&c));
        let adapter_empty = self.adapter.get(room_id).map_or(true, |m| m.is_empty());
        if room.is_empty() && adapter_empty {
            self.rooms.remove(room_id);
            debug!(room = %room_id, "room deleted");
        }
    }

    // ------------------------------------------------------------------
    // Connection teardown
    // ------------------------------------------------------------------

    /// Full disconnect cascade: remote-control teardown, then the room leave
    /// path, then the connection record itself.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        let Some(record) = self.connections.get(&conn) else { return };
        debug!(conn = %conn, uptime = ?record.connected_at.elapsed(), "connection teardown");
        self.teardown_remote(conn);
        self.room_leave(conn);

        // Transport rooms the connection joined without announcing a peer id
        // (create-room before joined-room) still hold its socket.
        let lingering: Vec<String> = self
            .adapter
            .iter()
            .filter(|(_, members)| members.contains(&conn))
            .map(|(room, _)| room.clone())
            .collect();
        for room_id in lingering {
            self.transport_leave(conn, &room_id);
            self.prune_room(&room_id);
        }

        self.connections.remove(&conn);
    }

    // ------------------------------------------------------------------
    // Debug instrumentation
    // ------------------------------------------------------------------

    /// Snapshot of per-session relay counters.
    pub fn traffic_snapshot(&self) -> Vec<SessionTraffic> {
        let mut out: Vec<SessionTraffic> = self
            .sessions
            .iter()
            .map(|(id, s)| SessionTraffic {
                session_id: id.clone(),
                host_id: s.host_id.clone(),
                frames_relayed: s.frames_relayed,
                inputs_relayed: s.inputs_relayed,
            })
            .collect();
        out.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        out
    }

    // ------------------------------------------------------------------
    // Inspection (integration tests, health reporting)
    // ------------------------------------------------------------------

    pub fn has_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn participants(&self, room_id: &str) -> Vec<String> {
        self.rooms.get(room_id).map(|r| r.participants.clone()).unwrap_or_default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn pending_request_count(&self) -> usize {
        self.pending_requests.len()
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
