//! Remote-control engine: host registry, claim arbitration, the consent
//! protocol, session binding, and the frame/input relay.
//!
//! Reads room membership only through connection-attached identity; the room
//! engine knows nothing about hosts or sessions.

use huddle_protocol::error::ErrorCode;
use huddle_protocol::events::{EndedBy, HostInfo, Ownership, ServerEvent, SetupStatus};
use huddle_protocol::input::sanitize_remote_event;
use huddle_protocol::sanitize::{build_suggested_host_id, is_likely_private_or_local};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::connection::ConnectionId;
use crate::engine::{Engine, Expiry, ASSIGNMENT_TTL, REQUEST_TTL, SETUP_TTL};

/// Frame payloads above this are dropped without notice.
const MAX_FRAME_BYTES: usize = 6 * 1024 * 1024;

/// A registered host agent.
#[derive(Debug, Clone)]
pub(crate) struct HostEntry {
    pub connection: ConnectionId,
    pub active_session_id: Option<String>,
    /// Network origin of the agent at registration time.
    pub network_id: String,
}

/// The in-room approver for requests targeting a host id.
#[derive(Debug, Clone)]
pub(crate) struct HostClaim {
    pub connection: ConnectionId,
    pub room_id: String,
}

/// Pre-authorization: the next registration of this host id auto-claims for
/// the target, provided the target is still in the room.
#[derive(Debug, Clone)]
pub(crate) struct SetupAssignment {
    pub target: ConnectionId,
    pub room_id: String,
    pub expires_at: Instant,
}

/// A remote-control consent request awaiting the approver's decision.
#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    pub host_id: String,
    pub host_connection: ConnectionId,
    pub controller_connection: ConnectionId,
    pub requester_peer_id: String,
    pub room_id: String,
    pub approver_connection: ConnectionId,
    pub expires_at: Instant,
}

/// A host-setup request awaiting the target's decision.
#[derive(Debug, Clone)]
pub(crate) struct PendingSetup {
    pub requester_connection: ConnectionId,
    pub requester_peer_id: String,
    pub target_connection: ConnectionId,
    pub target_peer_id: String,
    pub room_id: String,
    pub suggested_host_id: String,
    pub expires_at: Instant,
}

/// An active, exclusive host↔controller binding.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub host_id: String,
    pub host_connection: ConnectionId,
    pub controller_connection: ConnectionId,
    pub frames_relayed: u64,
    pub inputs_relayed: u64,
}

impl Engine {
    // ------------------------------------------------------------------
    // Host registration and listing
    // ------------------------------------------------------------------

    pub(crate) fn host_register(&mut self, conn: ConnectionId, host_id: String) {
        if host_id.is_empty() {
            self.emit(conn, ServerEvent::error(ErrorCode::HostRequired));
            return;
        }
        if let Some(existing) = self.hosts.get(&host_id) {
            if existing.connection != conn && self.connections.contains_key(&existing.connection) {
                self.emit(conn, ServerEvent::error(ErrorCode::HostIdInUse));
                return;
            }
        }
        // An agent re-registering under a new id abandons its previous one.
        let previous = self.connections.get(&conn).and_then(|c| c.remote_host_id.clone());
        if let Some(old_id) = previous {
            if old_id != host_id && self.hosts.get(&old_id).is_some_and(|h| h.connection == conn) {
                if let Some(sid) = self.hosts.get(&old_id).and_then(|h| h.active_session_id.clone())
                {
                    self.end_session(&sid, EndedBy::Host);
                }
                self.hosts.remove(&old_id);
            }
        }
        let network_id = self
            .connections
            .get(&conn)
            .map(|c| c.network_id.clone())
            .unwrap_or_default();
        self.hosts.insert(
            host_id.clone(),
            HostEntry { connection: conn, active_session_id: None, network_id },
        );
        if let Some(c) = self.connections.get_mut(&conn) {
            c.remote_host_id = Some(host_id.clone());
        }
        info!(conn = %conn, host = %host_id, "host registered");
        self.try_auto_claim(&host_id);
        self.emit(conn, ServerEvent::RemoteHostRegistered { host_id });
        self.broadcast_hosts();
    }

    /// Honor a live host-setup assignment: claim on the target's behalf and
    /// clear the assignment. Returns whether a claim was created.
    fn try_auto_claim(&mut self, host_id: &str) -> bool {
        let Some(assignment) = self.assignments.get(host_id) else { return false };
        if assignment.expires_at <= Instant::now() {
            self.assignments.remove(host_id);
            return false;
        }
        let (target, room_id) = (assignment.target, assignment.room_id.clone());
        let target_in_room = self
            .connections
            .get(&target)
            .is_some_and(|c| c.room_id.as_deref() == Some(room_id.as_str()));
        if !target_in_room {
            return false;
        }
        self.claims
            .insert(host_id.to_string(), HostClaim { connection: target, room_id: room_id.clone() });
        self.assignments.remove(host_id);
        info!(host = %host_id, conn = %target, room = %room_id, "host auto-claimed from setup assignment");
        self.emit(
            target,
            ServerEvent::RemoteHostClaimed { host_id: host_id.to_string(), room_id, auto: true },
        );
        true
    }

    /// Return the claim for a host id if it is still valid; stale claims
    /// (holder gone, or no longer in the claim's room) are reaped on sight.
    fn validated_claim(&mut self, host_id: &str) -> Option<HostClaim> {
        let claim = self.claims.get(host_id)?;
        let live_in_room = self
            .connections
            .get(&claim.connection)
            .is_some_and(|c| c.room_id.as_deref() == Some(claim.room_id.as_str()));
        if live_in_room {
            Some(claim.clone())
        } else {
            debug!(host = %host_id, "reaped stale claim");
            self.claims.remove(host_id);
            None
        }
    }

    /// The hosts list as one particular viewer sees it, sorted by host id.
    fn hosts_list_for(&mut self, viewer: ConnectionId) -> Vec<HostInfo> {
        let viewer_room = self.conn_room(viewer);
        let host_ids: Vec<String> = self.hosts.keys().cloned().collect();
        let mut out = Vec::with_capacity(host_ids.len());
        for host_id in host_ids {
            let busy = self.hosts.get(&host_id).is_some_and(|h| h.active_session_id.is_some());
            let ownership = match self.validated_claim(&host_id) {
                Some(claim) if viewer_room.as_deref() == Some(claim.room_id.as_str()) => {
                    if claim.connection == viewer {
                        Ownership::You
                    } else {
                        Ownership::Other
                    }
                }
                _ => Ownership::Unclaimed,
            };
            out.push(HostInfo { host_id, busy, ownership });
        }
        out
    }

    pub(crate) fn hosts_request(&mut self, conn: ConnectionId) {
        let hosts = self.hosts_list_for(conn);
        self.emit(conn, ServerEvent::RemoteHostsList { hosts });
    }

    /// Push the (per-viewer) hosts list to every connection. Called after any
    /// mutation that changes what the list would show.
    pub(crate) fn broadcast_hosts(&mut self) {
        let viewers: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for viewer in viewers {
            let hosts = self.hosts_list_for(viewer);
            self.emit(viewer, ServerEvent::RemoteHostsList { hosts });
        }
    }

    // ------------------------------------------------------------------
    // Claim arbitration
    // ------------------------------------------------------------------

    pub(crate) fn host_claim(&mut self, conn: ConnectionId, host_id: String) {
        if host_id.is_empty() {
            self.emit(conn, ServerEvent::error(ErrorCode::HostRequired));
            return;
        }
        let Some(room_id) = self.conn_room(conn) else {
            self.emit(conn, ServerEvent::error(ErrorCode::RoomRequired));
            return;
        };
        if let Some(assignment) = self.assignments.get(&host_id) {
            if assignment.expires_at <= Instant::now() {
                self.assignments.remove(&host_id);
            } else if assignment.target != conn || assignment.room_id != room_id {
                self.emit(conn, ServerEvent::error(ErrorCode::HostClaimAssignedOther));
                return;
            }
        }
        let Some(host) = self.hosts.get(&host_id) else {
            self.emit(conn, ServerEvent::error(ErrorCode::HostOffline));
            return;
        };
        let (host_conn, host_net) = (host.connection, host.network_id.clone());
        if !self.connections.contains_key(&host_conn) {
            self.hosts.remove(&host_id);
            self.emit(conn, ServerEvent::error(ErrorCode::HostOffline));
            self.broadcast_hosts();
            return;
        }
        let claimer_net = self
            .connections
            .get(&conn)
            .map(|c| c.network_id.clone())
            .unwrap_or_default();
        if !host_net.is_empty() && !claimer_net.is_empty() && host_net != claimer_net {
            self.emit(conn, ServerEvent::error(ErrorCode::HostClaimOwnerMismatch));
            return;
        }
        if let Some(claim) = self.validated_claim(&host_id) {
            if claim.connection != conn && claim.room_id == room_id {
                self.emit(conn, ServerEvent::error(ErrorCode::HostClaimedByOther));
                return;
            }
            // A claim in another room is stealable.
        }
        self.claims
            .insert(host_id.clone(), HostClaim { connection: conn, room_id: room_id.clone() });
        self.assignments.remove(&host_id);
        info!(conn = %conn, host = %host_id, room = %room_id, "host claimed");
        self.emit(conn, ServerEvent::RemoteHostClaimed { host_id, room_id, auto: false });
        self.broadcast_hosts();
    }

    // ------------------------------------------------------------------
    // Host-setup handshake
    // ------------------------------------------------------------------

    fn setup_error(&self, conn: ConnectionId, code: ErrorCode) {
        self.emit(
            conn,
            ServerEvent::RemoteHostSetupResult {
                status: SetupStatus::Error,
                request_id: None,
                target_peer_id: None,
                suggested_host_id: None,
                code: Some(code),
                message: Some(code.default_message()),
            },
        );
    }

    pub(crate) fn host_setup_request(
        &mut self,
        conn: ConnectionId,
        target_peer_id: Option<String>,
    ) -> Option<Expiry> {
        let (Some(room_id), Some(requester_peer)) = (self.conn_room(conn), self.conn_peer(conn))
        else {
            self.setup_error(conn, ErrorCode::RoomRequired);
            return None;
        };
        let already_pending = self
            .connections
            .get(&conn)
            .is_some_and(|c| c.pending_host_setup_request_id.is_some());
        if already_pending {
            self.setup_error(conn, ErrorCode::ControllerPending);
            return None;
        }
        let Some(room) = self.rooms.get(&room_id) else {
            self.setup_error(conn, ErrorCode::RoomRequired);
            return None;
        };
        let others: Vec<String> =
            room.participants.iter().filter(|p| **p != requester_peer).cloned().collect();
        if others.is_empty() {
            self.setup_error(conn, ErrorCode::ParticipantNotFound);
            return None;
        }
        let target_peer = match target_peer_id {
            Some(t) if t == requester_peer => {
                self.setup_error(conn, ErrorCode::ParticipantInvalid);
                return None;
            }
            Some(t) => {
                if !others.contains(&t) {
                    self.setup_error(conn, ErrorCode::ParticipantNotFound);
                    return None;
                }
                t
            }
            None if others.len() > 1 => {
                self.setup_error(conn, ErrorCode::ParticipantRequired);
                return None;
            }
            None => others[0].clone(),
        };
        let Some(&target_conn) =
            self.rooms.get(&room_id).and_then(|r| r.peer_to_connection.get(&target_peer))
        else {
            self.setup_error(conn, ErrorCode::ParticipantNotFound);
            return None;
        };
        if target_conn == conn {
            self.setup_error(conn, ErrorCode::ParticipantInvalid);
            return None;
        }

        let suggested_host_id = build_suggested_host_id(&target_peer);
        let request_id = Uuid::new_v4().to_string();
        self.pending_setups.insert(
            request_id.clone(),
            PendingSetup {
                requester_connection: conn,
                requester_peer_id: requester_peer.clone(),
                target_connection: target_conn,
                target_peer_id: target_peer.clone(),
                room_id,
                suggested_host_id: suggested_host_id.clone(),
                expires_at: Instant::now() + SETUP_TTL,
            },
        );
        if let Some(c) = self.connections.get_mut(&conn) {
            c.pending_host_setup_request_id = Some(request_id.clone());
        }
        if let Some(t) = self.connections.get_mut(&target_conn) {
            t.incoming_host_setup_request_id = Some(request_id.clone());
        }
        info!(conn = %conn, target = %target_conn, host = %suggested_host_id, "host setup requested");
        self.emit(
            conn,
            ServerEvent::RemoteHostSetupPending {
                request_id: request_id.clone(),
                target_peer_id: target_peer,
                suggested_host_id: suggested_host_id.clone(),
            },
        );
        self.emit(
            target_conn,
            ServerEvent::RemoteHostSetupRequested {
                request_id: request_id.clone(),
                requester_peer_id: requester_peer,
                suggested_host_id,
            },
        );
        Some(Expiry::PendingSetup { request_id })
    }

    pub(crate) fn host_setup_decision(
        &mut self,
        conn: ConnectionId,
        request_id: &str,
        accepted: bool,
    ) -> Option<Expiry> {
        // Only the target of the pending request may decide.
        let authorized =
            self.pending_setups.get(request_id).is_some_and(|s| s.target_connection == conn);
        if !authorized {
            return None;
        }
        let setup = self.pending_setups.remove(request_id)?;
        self.clear_setup_stamps(&setup, request_id);

        if !accepted {
            info!(request = %request_id, "host setup rejected");
            self.emit(
                setup.requester_connection,
                ServerEvent::RemoteHostSetupResult {
                    status: SetupStatus::Rejected,
                    request_id: Some(request_id.to_string()),
                    target_peer_id: Some(setup.target_peer_id),
                    suggested_host_id: Some(setup.suggested_host_id),
                    code: None,
                    message: None,
                },
            );
            return None;
        }

        self.assignments.insert(
            setup.suggested_host_id.clone(),
            SetupAssignment {
                target: setup.target_connection,
                room_id: setup.room_id.clone(),
                expires_at: Instant::now() + ASSIGNMENT_TTL,
            },
        );
        info!(host = %setup.suggested_host_id, target = %setup.target_connection, "host setup accepted, assignment armed");

        // An agent already online under the suggested id in this room is
        // claimed immediately instead of waiting for a re-registration.
        let host_here = self.hosts.get(&setup.suggested_host_id).is_some_and(|h| {
            self.connections
                .get(&h.connection)
                .is_some_and(|c| c.room_id.as_deref() == Some(setup.room_id.as_str()))
        });
        let claimed = host_here && self.try_auto_claim(&setup.suggested_host_id);

        self.emit(
            setup.requester_connection,
            ServerEvent::RemoteHostSetupResult {
                status: SetupStatus::Accepted,
                request_id: Some(request_id.to_string()),
                target_peer_id: Some(setup.target_peer_id.clone()),
                suggested_host_id: Some(setup.suggested_host_id.clone()),
                code: None,
                message: None,
            },
        );
        if claimed {
            self.broadcast_hosts();
        }
        Some(Expiry::Assignment { host_id: setup.suggested_host_id })
    }

    fn clear_setup_stamps(&mut self, setup: &PendingSetup, request_id: &str) {
        if let Some(c) = self.connections.get_mut(&setup.requester_connection) {
            if c.pending_host_setup_request_id.as_deref() == Some(request_id) {
                c.pending_host_setup_request_id = None;
            }
        }
        if let Some(t) = self.connections.get_mut(&setup.target_connection) {
            if t.incoming_host_setup_request_id.as_deref() == Some(request_id) {
                t.incoming_host_setup_request_id = None;
            }
        }
    }

    // ------------------------------------------------------------------
    // Session request / approval
    // ------------------------------------------------------------------

    pub(crate) fn session_request(&mut self, conn: ConnectionId, host_id: String) -> Option<Expiry> {
        if host_id.is_empty() {
            self.emit(conn, ServerEvent::error(ErrorCode::HostRequired));
            return None;
        }
        let Some(host) = self.hosts.get(&host_id) else {
            self.emit(conn, ServerEvent::error(ErrorCode::HostNotFound));
            return None;
        };
        let (host_conn, host_net, host_busy) =
            (host.connection, host.network_id.clone(), host.active_session_id.is_some());
        if !self.connections.contains_key(&host_conn) {
            self.hosts.remove(&host_id);
            self.emit(conn, ServerEvent::error(ErrorCode::HostOffline));
            self.broadcast_hosts();
            return None;
        }

        if !self.config.allow_same_machine {
            let requester_net = self
                .connections
                .get(&conn)
                .map(|c| c.network_id.clone())
                .unwrap_or_default();
            if !requester_net.is_empty()
                && requester_net == host_net
                && is_likely_private_or_local(&requester_net)
            {
                self.emit(conn, ServerEvent::error(ErrorCode::SelfHostMachineBlocked));
                return None;
            }
        }

        if host_busy {
            self.emit(conn, ServerEvent::error(ErrorCode::HostBusy));
            return None;
        }
        if self.pending_requests.values().any(|r| r.host_id == host_id) {
            self.emit(conn, ServerEvent::error(ErrorCode::HostPending));
            return None;
        }
        let (controlling, pending) = self
            .connections
            .get(&conn)
            .map(|c| (c.controller_session_id.clone(), c.pending_remote_request_id.clone()))
            .unwrap_or_default();
        if controlling.is_some() {
            self.emit(conn, ServerEvent::error(ErrorCode::ControllerBusy));
            return None;
        }
        if pending.is_some() {
            self.emit(conn, ServerEvent::error(ErrorCode::ControllerPending));
            return None;
        }
        let (Some(room_id), Some(requester_peer)) = (self.conn_room(conn), self.conn_peer(conn))
        else {
            self.emit(conn, ServerEvent::error(ErrorCode::RoomRequired));
            return None;
        };

        let approver = match self.validated_claim(&host_id) {
            Some(claim) if claim.room_id == room_id => claim.connection,
            _ => {
                self.emit(conn, ServerEvent::error(ErrorCode::HostOwnerUnclaimed));
                return None;
            }
        };
        if approver == conn {
            self.emit(conn, ServerEvent::error(ErrorCode::SelfHostRequestBlocked));
            return None;
        }

        let request_id = Uuid::new_v4().to_string();
        self.pending_requests.insert(
            request_id.clone(),
            PendingRequest {
                host_id: host_id.clone(),
                host_connection: host_conn,
                controller_connection: conn,
                requester_peer_id: requester_peer.clone(),
                room_id: room_id.clone(),
                approver_connection: approver,
                expires_at: Instant::now() + REQUEST_TTL,
            },
        );
        if let Some(c) = self.connections.get_mut(&conn) {
            c.pending_remote_request_id = Some(request_id.clone());
        }
        info!(conn = %conn, host = %host_id, approver = %approver, request = %request_id, "remote session requested");
        self.emit(
            conn,
            ServerEvent::RemoteSessionPending {
                request_id: request_id.clone(),
                host_id: host_id.clone(),
            },
        );
        self.emit(
            approver,
            ServerEvent::RemoteSessionRequestedUi {
                request_id: request_id.clone(),
                host_id,
                requester_peer_id: requester_peer,
                room_id,
            },
        );
        Some(Expiry::PendingRequest { request_id })
    }

    pub(crate) fn session_decision(
        &mut self,
        conn: ConnectionId,
        request_id: &str,
        accepted: bool,
        reason: Option<String>,
    ) {
        // Either the claim holder or the host agent may decide.
        let authorized = self
            .pending_requests
            .get(request_id)
            .is_some_and(|r| conn == r.approver_connection || conn == r.host_connection);
        if !authorized {
            return;
        }
        let Some(req) = self.pending_requests.remove(request_id) else { return };
        if let Some(c) = self.connections.get_mut(&req.controller_connection) {
            if c.pending_remote_request_id.as_deref() == Some(request_id) {
                c.pending_remote_request_id = None;
            }
        }

        if !accepted {
            let message = reason
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| ErrorCode::RequestRejected.default_message());
            info!(request = %request_id, "remote session request rejected");
            self.emit(
                req.controller_connection,
                ServerEvent::error_with_message(ErrorCode::RequestRejected, message),
            );
            return;
        }

        // Re-validate against current state; the consent window is racy by
        // nature and each check has an interested party to notify.
        let host_ok = self.hosts.get(&req.host_id).is_some_and(|h| {
            h.connection == req.host_connection && self.connections.contains_key(&h.connection)
        });
        if !host_ok {
            self.emit(req.controller_connection, ServerEvent::error(ErrorCode::HostOffline));
            return;
        }
        if self.hosts.get(&req.host_id).is_some_and(|h| h.active_session_id.is_some()) {
            self.emit(req.controller_connection, ServerEvent::error(ErrorCode::HostBusy));
            return;
        }
        let Some(controller) = self.connections.get(&req.controller_connection) else {
            self.emit(req.host_connection, ServerEvent::error(ErrorCode::ControllerDisconnected));
            return;
        };
        if controller.controller_session_id.is_some() || controller.pending_remote_request_id.is_some()
        {
            self.emit(req.host_connection, ServerEvent::error(ErrorCode::ControllerBusy));
            return;
        }

        let session_id = Uuid::new_v4().to_string();
        self.sessions.insert(
            session_id.clone(),
            Session {
                host_id: req.host_id.clone(),
                host_connection: req.host_connection,
                controller_connection: req.controller_connection,
                frames_relayed: 0,
                inputs_relayed: 0,
            },
        );
        if let Some(h) = self.hosts.get_mut(&req.host_id) {
            h.active_session_id = Some(session_id.clone());
        }
        if let Some(c) = self.connections.get_mut(&req.controller_connection) {
            c.controller_session_id = Some(session_id.clone());
        }
        if let Some(hc) = self.connections.get_mut(&req.host_connection) {
            hc.host_session_id = Some(session_id.clone());
        }
        info!(session = %session_id, host = %req.host_id, "remote session started");
        for endpoint in [req.controller_connection, req.host_connection] {
            self.emit(
                endpoint,
                ServerEvent::RemoteSessionStarted {
                    session_id: session_id.clone(),
                    host_id: req.host_id.clone(),
                },
            );
        }
        self.broadcast_hosts();
    }

    // ------------------------------------------------------------------
    // Session relay
    // ------------------------------------------------------------------

    pub(crate) fn host_frame(
        &mut self,
        conn: ConnectionId,
        session_id: &str,
        image: String,
        width: Option<f64>,
        height: Option<f64>,
        timestamp: Option<f64>,
    ) {
        let Some(session) = self.sessions.get_mut(session_id) else { return };
        if session.host_connection != conn {
            return;
        }
        if image.is_empty() || image.len() > MAX_FRAME_BYTES {
            return;
        }
        session.frames_relayed += 1;
        let controller = session.controller_connection;
        let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp_millis() as f64);
        self.emit(
            controller,
            ServerEvent::RemoteFrame {
                session_id: session_id.to_string(),
                image,
                width,
                height,
                timestamp,
            },
        );
    }

    pub(crate) fn remote_input(&mut self, conn: ConnectionId, session_id: &str, event: &Value) {
        let Some(session) = self.sessions.get_mut(session_id) else { return };
        if session.controller_connection != conn {
            return;
        }
        let Some(event) = sanitize_remote_event(event) else { return };
        session.inputs_relayed += 1;
        let host = session.host_connection;
        self.emit(host, ServerEvent::RemoteInput { session_id: session_id.to_string(), event });
    }

    // ------------------------------------------------------------------
    // Session termination
    // ------------------------------------------------------------------

    pub(crate) fn session_stop(&mut self, conn: ConnectionId, session_id: Option<String>) {
        let resolved = session_id
            .filter(|id| self.sessions.contains_key(id))
            .or_else(|| self.connections.get(&conn).and_then(|c| c.host_session_id.clone()))
            .or_else(|| self.connections.get(&conn).and_then(|c| c.controller_session_id.clone()));

        let Some(sid) = resolved else {
            // No session to stop: a controller may be withdrawing its
            // pending consent request instead.
            let pending =
                self.connections.get(&conn).and_then(|c| c.pending_remote_request_id.clone());
            if let Some(request_id) = pending {
                if let Some(req) = self.pending_requests.remove(&request_id) {
                    info!(request = %request_id, "pending remote request cancelled");
                    self.emit(req.host_connection, ServerEvent::error(ErrorCode::RequestCancelled));
                }
                if let Some(c) = self.connections.get_mut(&conn) {
                    c.pending_remote_request_id = None;
                }
            }
            return;
        };

        let Some(session) = self.sessions.get(&sid) else { return };
        let ended_by = if session.host_connection == conn {
            EndedBy::Host
        } else if session.controller_connection == conn {
            EndedBy::Controller
        } else {
            return;
        };
        self.end_session(&sid, ended_by);
    }

    /// Tear down a session and notify both endpoints. Idempotent: a second
    /// call for the same id is a no-op.
    pub(crate) fn end_session(&mut self, session_id: &str, ended_by: EndedBy) {
        let Some(session) = self.sessions.remove(session_id) else { return };
        if let Some(h) = self.hosts.get_mut(&session.host_id) {
            if h.active_session_id.as_deref() == Some(session_id) {
                h.active_session_id = None;
            }
        }
        if let Some(hc) = self.connections.get_mut(&session.host_connection) {
            if hc.host_session_id.as_deref() == Some(session_id) {
                hc.host_session_id = None;
            }
        }
        if let Some(cc) = self.connections.get_mut(&session.controller_connection) {
            if cc.controller_session_id.as_deref() == Some(session_id) {
                cc.controller_session_id = None;
            }
        }
        info!(session = %session_id, host = %session.host_id, ended_by = ?ended_by, "remote session ended");
        for endpoint in [session.host_connection, session.controller_connection] {
            self.emit(
                endpoint,
                ServerEvent::RemoteSessionEnded {
                    session_id: session_id.to_string(),
                    host_id: session.host_id.clone(),
                    ended_by,
                },
            );
        }
        self.broadcast_hosts();
    }

    // ------------------------------------------------------------------
    // Teardown cascades
    // ------------------------------------------------------------------

    fn cancel_pending_request(&mut self, request_id: &str, code: ErrorCode) {
        let Some(req) = self.pending_requests.remove(request_id) else { return };
        if let Some(c) = self.connections.get_mut(&req.controller_connection) {
            if c.pending_remote_request_id.as_deref() == Some(request_id) {
                c.pending_remote_request_id = None;
            }
        }
        self.emit(req.controller_connection, ServerEvent::error(code));
    }

    fn teardown_claims_and_assignments(&mut self, conn: ConnectionId) -> bool {
        let before = self.claims.len();
        self.claims.retain(|_, claim| claim.connection != conn);
        self.assignments.retain(|_, assignment| assignment.target != conn);
        self.claims.len() != before
    }

    fn teardown_setups(&mut self, conn: ConnectionId) {
        // Outgoing setup request: dropped without notification.
        let outgoing =
            self.connections.get(&conn).and_then(|c| c.pending_host_setup_request_id.clone());
        if let Some(request_id) = outgoing {
            if let Some(setup) = self.pending_setups.remove(&request_id) {
                self.clear_setup_stamps(&setup, &request_id);
            } else if let Some(c) = self.connections.get_mut(&conn) {
                c.pending_host_setup_request_id = None;
            }
        }
        // Incoming setup requests: the requester learns the target is gone.
        let incoming: Vec<String> = self
            .pending_setups
            .iter()
            .filter(|(_, s)| s.target_connection == conn)
            .map(|(id, _)| id.clone())
            .collect();
        for request_id in incoming {
            if let Some(setup) = self.pending_setups.remove(&request_id) {
                self.clear_setup_stamps(&setup, &request_id);
                self.emit(
                    setup.requester_connection,
                    ServerEvent::RemoteHostSetupResult {
                        status: SetupStatus::TargetDisconnected,
                        request_id: Some(request_id.clone()),
                        target_peer_id: Some(setup.target_peer_id),
                        suggested_host_id: Some(setup.suggested_host_id),
                        code: None,
                        message: None,
                    },
                );
            }
        }
    }

    /// Remote-control side of `leave-room`: drop claims and assignments tied
    /// to the connection and cancel setup requests in both directions. Host
    /// registrations, sessions and pending session requests survive.
    pub(crate) fn teardown_claims_and_setups(&mut self, conn: ConnectionId) {
        let claims_changed = self.teardown_claims_and_assignments(conn);
        self.teardown_setups(conn);
        if claims_changed {
            self.broadcast_hosts();
        }
    }

    /// Remote-control side of a disconnect, in cascade order.
    pub(crate) fn teardown_remote(&mut self, conn: ConnectionId) {
        let mut lists_changed = false;

        // Registered host: end its session, cancel requests aimed at it,
        // drop the registry entry.
        let owned: Vec<String> = self
            .hosts
            .iter()
            .filter(|(_, h)| h.connection == conn)
            .map(|(id, _)| id.clone())
            .collect();
        for host_id in &owned {
            if let Some(sid) = self.hosts.get(host_id).and_then(|h| h.active_session_id.clone()) {
                self.end_session(&sid, EndedBy::HostDisconnected);
            }
            self.hosts.remove(host_id);
            info!(conn = %conn, host = %host_id, "host unregistered on disconnect");
            lists_changed = true;
        }
        let aimed: Vec<String> = self
            .pending_requests
            .iter()
            .filter(|(_, r)| r.host_connection == conn)
            .map(|(id, _)| id.clone())
            .collect();
        for request_id in aimed {
            self.cancel_pending_request(&request_id, ErrorCode::HostDisconnected);
        }

        // Claims held by, and assignments targeting, this connection.
        lists_changed |= self.teardown_claims_and_assignments(conn);

        // Own pending consent request: tell the host agent.
        let own_request =
            self.connections.get(&conn).and_then(|c| c.pending_remote_request_id.clone());
        if let Some(request_id) = own_request {
            if let Some(req) = self.pending_requests.remove(&request_id) {
                self.emit(
                    req.host_connection,
                    ServerEvent::error(ErrorCode::ControllerDisconnected),
                );
            }
            if let Some(c) = self.connections.get_mut(&conn) {
                c.pending_remote_request_id = None;
            }
        }

        // Requests waiting on this connection's approval.
        let approving: Vec<String> = self
            .pending_requests
            .iter()
            .filter(|(_, r)| r.approver_connection == conn)
            .map(|(id, _)| id.clone())
            .collect();
        for request_id in approving {
            self.cancel_pending_request(&request_id, ErrorCode::ApproverDisconnected);
        }

        // Host-setup requests in both directions.
        self.teardown_setups(conn);

        // Controller-role session.
        let controlling =
            self.connections.get(&conn).and_then(|c| c.controller_session_id.clone());
        if let Some(sid) = controlling {
            self.end_session(&sid, EndedBy::ControllerDisconnected);
        }

        if lists_changed {
            self.broadcast_hosts();
        }
    }

    // ------------------------------------------------------------------
    // Timer-driven cleanup. Each is idempotent against missing records so a
    // timer racing an explicit cancel is a no-op.
    // ------------------------------------------------------------------

    pub fn expire_pending_request(&mut self, request_id: &str) {
        let due = self
            .pending_requests
            .get(request_id)
            .is_some_and(|r| r.expires_at <= Instant::now());
        if due {
            debug!(request = %request_id, "pending remote request timed out");
            self.cancel_pending_request(request_id, ErrorCode::RequestTimeout);
        }
    }

    pub fn expire_pending_setup(&mut self, request_id: &str) {
        let due = self
            .pending_setups
            .get(request_id)
            .is_some_and(|s| s.expires_at <= Instant::now());
        if !due {
            return;
        }
        let Some(setup) = self.pending_setups.remove(request_id) else { return };
        debug!(request = %request_id, "host setup request timed out");
        self.clear_setup_stamps(&setup, request_id);
        self.emit(
            setup.requester_connection,
            ServerEvent::RemoteHostSetupResult {
                status: SetupStatus::Timeout,
                request_id: Some(request_id.to_string()),
                target_peer_id: Some(setup.target_peer_id),
                suggested_host_id: Some(setup.suggested_host_id),
                code: None,
                message: None,
            },
        );
    }

    pub fn expire_assignment(&mut self, host_id: &str) {
        // The key may have been re-armed by a newer assignment; only reap the
        // one this timer was scheduled against.
        let expired =
            self.assignments.get(host_id).is_some_and(|a| a.expires_at <= Instant::now());
        if expired {
            debug!(host = %host_id, "host setup assignment expired");
            self.assignments.remove(host_id);
        }
    }
}
