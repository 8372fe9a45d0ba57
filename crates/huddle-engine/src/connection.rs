//! Per-connection identity and attached scratch state.

use std::fmt;

use huddle_protocol::ServerEvent;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Opaque identifier for one transport connection. Assigned in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine-side record of a live connection.
///
/// The outbound sender is the only handle to the peer; dropping the record is
/// how a connection stops receiving events. The optional fields are the
/// mutable scratch state the two engines stamp onto a connection as it moves
/// through the room and remote-control state machines.
pub(crate) struct Connection {
    pub connected_at: Instant,
    pub network_id: String,
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    pub room_id: Option<String>,
    pub peer_id: Option<String>,
    pub remote_host_id: Option<String>,
    pub controller_session_id: Option<String>,
    pub host_session_id: Option<String>,
    pub pending_remote_request_id: Option<String>,
    pub pending_host_setup_request_id: Option<String>,
    pub incoming_host_setup_request_id: Option<String>,
}

impl Connection {
    pub fn new(network_id: String, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            connected_at: Instant::now(),
            network_id,
            sender,
            room_id: None,
            peer_id: None,
            remote_host_id: None,
            controller_session_id: None,
            host_session_id: None,
            pending_remote_request_id: None,
            pending_host_setup_request_id: None,
            incoming_host_setup_request_id: None,
        }
    }

    /// Push an event to this connection. A closed receiver means the socket
    /// is already gone; the disconnect cascade will reap the record.
    pub fn send(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}
