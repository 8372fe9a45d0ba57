//! Wire protocol for the Huddle signaling server.
//!
//! Clients exchange JSON envelopes of the form `{"event": <name>, "data":
//! <payload>}` over a message-oriented transport. Inbound payloads are
//! untrusted and pass through the sanitizers in [`sanitize`] and [`input`]
//! before the engine sees them; outbound events are the typed
//! [`events::ServerEvent`] enum.

pub mod error;
pub mod events;
pub mod input;
pub mod sanitize;

pub use error::ErrorCode;
pub use events::{ClientEvent, Envelope, ServerEvent};
pub use input::RemoteInputEvent;
