//! The in-memory coordination engine behind the Huddle signaling server.
//!
//! Three entangled registries live here: room membership, the host registry
//! with claim arbitration, and the remote-control session lifecycle. All of
//! them are owned exclusively by [`Engine`]; the transport layer talks to it
//! through [`EngineHandle`], which serializes every mutation behind one lock
//! and schedules consent-window expiries.

mod connection;
mod engine;
mod handle;
mod remote;
mod rooms;

pub use connection::ConnectionId;
pub use engine::{Engine, EngineConfig, Expiry, SessionTraffic};
pub use handle::EngineHandle;
