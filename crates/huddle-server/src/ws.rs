//! WebSocket gateway.
//!
//! Each client speaks JSON envelopes (`{"event", "data"}`) over a WebSocket.
//! When an admission token is configured, the first frame must be an `auth`
//! envelope carrying it; the connection is refused with `unauthorized`
//! before any engine state attaches. After admission, inbound frames are
//! parsed and dispatched to the engine, and the engine's outbound channel is
//! pumped back into the socket until either side closes.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMsg, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use huddle_engine::EngineHandle;
use huddle_protocol::events::{ClientEvent, Envelope, ServerEvent};
use huddle_protocol::sanitize::network_id_from;

/// Per-connection payload cap (8 MiB), enforced by the WebSocket layer
/// before dispatch.
const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Window for the auth envelope when a token is required.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state for the HTTP and WebSocket handlers.
pub struct AppState {
    pub engine: EngineHandle,
    pub admission_token: Option<String>,
    pub host_app_zip: Option<PathBuf>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let network_id = network_id_from(forwarded.as_deref(), &addr.ip().to_string());
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state, network_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, network_id: String) {
    let (mut sink, mut stream) = socket.split();

    if let Some(expected) = &state.admission_token {
        if let Err(reason) = authenticate(&mut stream, expected).await {
            debug!(%network_id, reason, "handshake refused");
            let refusal = ServerEvent::ConnectError { message: "unauthorized".into() };
            if let Ok(text) = serde_json::to_string(&refusal) {
                let _ = sink.send(WsMsg::Text(text.into())).await;
            }
            let _ = sink.close().await;
            return;
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = state.engine.connect(network_id.clone(), tx);
    debug!(conn = %conn, %network_id, "websocket connected");

    let engine = state.engine.clone();
    let inbound = async {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(WsMsg::Text(text)) => match serde_json::from_str::<Envelope>(&text) {
                    Ok(envelope) => match ClientEvent::parse(&envelope.event, &envelope.data) {
                        Some(event) => engine.dispatch(conn, event),
                        None => {
                            debug!(conn = %conn, event = %envelope.event, "dropping unknown event");
                        }
                    },
                    Err(err) => debug!(conn = %conn, %err, "dropping malformed frame"),
                },
                Ok(WsMsg::Ping(_)) | Ok(WsMsg::Pong(_)) => continue,
                Ok(WsMsg::Close(_)) | Err(_) => break,
                // Binary frames are not part of the protocol.
                Ok(_) => continue,
            }
        }
    };

    let outbound = async {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(err) => {
                    warn!(conn = %conn, %err, "failed to encode outbound event");
                    continue;
                }
            };
            if sink.send(WsMsg::Text(text.into())).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        _ = inbound => {}
        _ = outbound => {}
    }

    state.engine.disconnect(conn);
    debug!(conn = %conn, "websocket disconnected");
}

/// Read the auth envelope and compare its token (trimmed, exact) against the
/// configured one.
async fn authenticate(
    stream: &mut SplitStream<WebSocket>,
    expected: &str,
) -> Result<(), &'static str> {
    let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(WsMsg::Text(text)) => return Some(text),
                Ok(WsMsg::Ping(_)) | Ok(WsMsg::Pong(_)) => continue,
                _ => return None,
            }
        }
        None
    })
    .await
    .ok()
    .flatten();

    let Some(text) = first else { return Err("no auth envelope") };
    let Ok(envelope) = serde_json::from_str::<Envelope>(&text) else {
        return Err("malformed auth envelope");
    };
    if envelope.event != "auth" {
        return Err("expected auth envelope");
    }
    let token = envelope
        .data
        .get("token")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if token == expected {
        Ok(())
    } else {
        Err("token mismatch")
    }
}
