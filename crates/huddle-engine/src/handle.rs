//! Shared handle over the engine.
//!
//! One mutex guards every registry, so cascade operations (a disconnect
//! tearing through rooms, hosts and sessions) mutate a consistent snapshot.
//! Handlers never await while holding the lock; outbound fanout goes through
//! per-connection channels drained by the transport.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use huddle_protocol::events::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;

use crate::connection::ConnectionId;
use crate::engine::{Engine, EngineConfig, Expiry, SessionTraffic};

/// Cloneable, thread-safe handle to the [`Engine`].
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<Mutex<Engine>>,
}

impl EngineHandle {
    pub fn new(config: EngineConfig) -> Self {
        Self { inner: Arc::new(Mutex::new(Engine::new(config))) }
    }

    fn lock(&self) -> MutexGuard<'_, Engine> {
        // A panic inside a handler must not take the whole broker down with
        // it; the registries stay usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new connection and return its id.
    pub fn connect(
        &self,
        network_id: String,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> ConnectionId {
        self.lock().connect(network_id, sender)
    }

    /// Route one inbound event, arming whatever deadlines it produced.
    pub fn dispatch(&self, conn: ConnectionId, event: ClientEvent) {
        let expiries = self.lock().dispatch(conn, event);
        for expiry in expiries {
            self.arm(expiry);
        }
    }

    /// Run the full disconnect cascade for a dropped connection.
    pub fn disconnect(&self, conn: ConnectionId) {
        self.lock().disconnect(conn);
    }

    /// Per-session relay counters, for the debug traffic reporter.
    pub fn traffic_snapshot(&self) -> Vec<SessionTraffic> {
        self.lock().traffic_snapshot()
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connection_count()
    }

    /// Arm a deadline. Firing funnels into the engine's idempotent cleanup,
    /// so a record cancelled in the meantime makes the timer a no-op.
    fn arm(&self, expiry: Expiry) {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(expiry.delay()).await;
            let mut engine = handle.lock();
            match &expiry {
                Expiry::PendingRequest { request_id } => engine.expire_pending_request(request_id),
                Expiry::PendingSetup { request_id } => engine.expire_pending_setup(request_id),
                Expiry::Assignment { host_id } => engine.expire_assignment(host_id),
            }
        });
    }
}
