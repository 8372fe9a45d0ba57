//! Inbound and outbound event surface.
//!
//! The wire envelope is `{"event": <name>, "data": <payload>}`. Inbound
//! envelopes carry untrusted JSON and are narrowed into [`ClientEvent`]
//! variants with identifier fields already sanitized; events with an unknown
//! name parse to `None` and are dropped by the gateway.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;
use crate::input::RemoteInputEvent;
use crate::sanitize::{sanitize_string, DEFAULT_MAX_LEN, HOST_ID_MAX_LEN};

/// Raw wire envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// A parsed inbound event. Identifier fields are trimmed and capped; payloads
/// that need deeper validation (frames, input events) stay close to the wire
/// and are checked by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    CreateRoom,
    JoinedRoom { room_id: String, peer_id: String },
    Ready,
    LeaveRoom,
    HostRegister { host_id: String },
    HostClaim { host_id: String },
    HostsRequest,
    HostSetupRequest { target_peer_id: Option<String> },
    HostSetupDecision { request_id: String, accepted: bool },
    SessionRequest { host_id: String },
    SessionDecision { request_id: String, accepted: bool, reason: Option<String> },
    SessionStop { session_id: Option<String> },
    HostFrame {
        session_id: String,
        image: String,
        width: Option<f64>,
        height: Option<f64>,
        timestamp: Option<f64>,
    },
    RemoteInput { session_id: String, event: Value },
}

fn field<'a>(data: &'a Value, name: &str) -> &'a Value {
    data.get(name).unwrap_or(&Value::Null)
}

fn id_field(data: &Value, name: &str) -> String {
    sanitize_string(field(data, name), DEFAULT_MAX_LEN)
}

fn opt_id_field(data: &Value, name: &str) -> Option<String> {
    let v = id_field(data, name);
    if v.is_empty() { None } else { Some(v) }
}

fn finite_field(data: &Value, name: &str) -> Option<f64> {
    field(data, name).as_f64().filter(|n| n.is_finite())
}

impl ClientEvent {
    /// Parse a named event, returning `None` for unknown names. The legacy
    /// `remote-session-ui-decision` name maps onto the current decision event.
    pub fn parse(event: &str, data: &Value) -> Option<Self> {
        let ev = match event {
            "create-room" => Self::CreateRoom,
            "joined-room" => Self::JoinedRoom {
                room_id: id_field(data, "roomId"),
                peer_id: id_field(data, "peerId"),
            },
            "ready" => Self::Ready,
            "leave-room" => Self::LeaveRoom,
            "remote-host-register" => Self::HostRegister {
                host_id: sanitize_string(field(data, "hostId"), HOST_ID_MAX_LEN),
            },
            "remote-host-claim" => Self::HostClaim {
                host_id: sanitize_string(field(data, "hostId"), HOST_ID_MAX_LEN),
            },
            "remote-hosts-request" => Self::HostsRequest,
            "remote-host-setup-request" => Self::HostSetupRequest {
                target_peer_id: opt_id_field(data, "targetPeerId"),
            },
            "remote-host-setup-decision" => Self::HostSetupDecision {
                request_id: id_field(data, "requestId"),
                accepted: field(data, "accepted").as_bool().unwrap_or(false),
            },
            "remote-session-request" => Self::SessionRequest {
                host_id: sanitize_string(field(data, "hostId"), HOST_ID_MAX_LEN),
            },
            "remote-session-decision" | "remote-session-ui-decision" => Self::SessionDecision {
                request_id: id_field(data, "requestId"),
                accepted: field(data, "accepted").as_bool().unwrap_or(false),
                reason: opt_id_field(data, "reason"),
            },
            "remote-session-stop" => Self::SessionStop {
                session_id: opt_id_field(data, "sessionId"),
            },
            "remote-host-frame" => Self::HostFrame {
                session_id: id_field(data, "sessionId"),
                image: field(data, "image").as_str().unwrap_or_default().to_string(),
                width: finite_field(data, "width"),
                height: finite_field(data, "height"),
                timestamp: finite_field(data, "timestamp"),
            },
            "remote-input" => Self::RemoteInput {
                session_id: id_field(data, "sessionId"),
                event: field(data, "event").clone(),
            },
            _ => return None,
        };
        Some(ev)
    }
}

/// Host ownership as seen by one particular viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    Unclaimed,
    You,
    Other,
}

/// One row of the hosts list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub host_id: String,
    pub busy: bool,
    pub ownership: Ownership,
}

/// Who ended a session, as reported on `remote-session-ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndedBy {
    Host,
    Controller,
    HostDisconnected,
    ControllerDisconnected,
}

/// Outcome of a host-setup request, inlined in `remote-host-setup-result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SetupStatus {
    Accepted,
    Rejected,
    Timeout,
    TargetDisconnected,
    Error,
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Server-to-client events. Serializes to the `{"event", "data"}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    RoomCreated { room_id: String },
    #[serde(rename_all = "camelCase")]
    RoomNotFound { room_id: String },
    #[serde(rename_all = "camelCase")]
    GetUsers { room_id: String, participants: Vec<String> },
    #[serde(rename_all = "camelCase")]
    UserJoined { peer_id: String },
    #[serde(rename_all = "camelCase")]
    UserLeft { peer_id: String },
    RemoteHostsList { hosts: Vec<HostInfo> },
    #[serde(rename_all = "camelCase")]
    RemoteHostRegistered { host_id: String },
    #[serde(rename_all = "camelCase")]
    RemoteHostClaimed {
        host_id: String,
        room_id: String,
        #[serde(default, skip_serializing_if = "is_false")]
        auto: bool,
    },
    #[serde(rename_all = "camelCase")]
    RemoteHostSetupPending {
        request_id: String,
        target_peer_id: String,
        suggested_host_id: String,
    },
    #[serde(rename_all = "camelCase")]
    RemoteHostSetupRequested {
        request_id: String,
        requester_peer_id: String,
        suggested_host_id: String,
    },
    #[serde(rename_all = "camelCase")]
    RemoteHostSetupResult {
        status: SetupStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_peer_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suggested_host_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<ErrorCode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    RemoteSessionPending { request_id: String, host_id: String },
    #[serde(rename_all = "camelCase")]
    RemoteSessionRequestedUi {
        request_id: String,
        host_id: String,
        requester_peer_id: String,
        room_id: String,
    },
    #[serde(rename_all = "camelCase")]
    RemoteSessionStarted { session_id: String, host_id: String },
    #[serde(rename_all = "camelCase")]
    RemoteSessionEnded {
        session_id: String,
        host_id: String,
        ended_by: EndedBy,
    },
    RemoteSessionError { code: ErrorCode, message: String },
    #[serde(rename_all = "camelCase")]
    RemoteFrame {
        session_id: String,
        image: String,
        width: Option<f64>,
        height: Option<f64>,
        timestamp: f64,
    },
    #[serde(rename_all = "camelCase")]
    RemoteInput {
        session_id: String,
        event: RemoteInputEvent,
    },
    ConnectError { message: String },
}

impl ServerEvent {
    /// Build a `remote-session-error` carrying the code's default message.
    pub fn error(code: ErrorCode) -> Self {
        Self::RemoteSessionError { code, message: code.default_message() }
    }

    /// Build a `remote-session-error` with an explicit message.
    pub fn error_with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::RemoteSessionError { code, message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_joined_room_sanitizes_fields() {
        let ev = ClientEvent::parse(
            "joined-room",
            &json!({"roomId": "  r1  ", "peerId": "p1", "junk": true}),
        )
        .unwrap();
        assert_eq!(ev, ClientEvent::JoinedRoom { room_id: "r1".into(), peer_id: "p1".into() });
    }

    #[test]
    fn parse_tolerates_missing_and_wrongly_typed_payloads() {
        let ev = ClientEvent::parse("joined-room", &Value::Null).unwrap();
        assert_eq!(ev, ClientEvent::JoinedRoom { room_id: String::new(), peer_id: String::new() });

        let ev = ClientEvent::parse("remote-host-register", &json!({"hostId": 7})).unwrap();
        assert_eq!(ev, ClientEvent::HostRegister { host_id: String::new() });
    }

    #[test]
    fn parse_caps_host_id_at_64() {
        let long = "h".repeat(100);
        let ev = ClientEvent::parse("remote-host-claim", &json!({"hostId": long})).unwrap();
        match ev {
            ClientEvent::HostClaim { host_id } => assert_eq!(host_id.len(), 64),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parse_legacy_decision_alias() {
        let data = json!({"requestId": "r", "accepted": true});
        let modern = ClientEvent::parse("remote-session-decision", &data).unwrap();
        let legacy = ClientEvent::parse("remote-session-ui-decision", &data).unwrap();
        assert_eq!(modern, legacy);
    }

    #[test]
    fn parse_decision_defaults_to_rejection() {
        let ev = ClientEvent::parse("remote-session-decision", &json!({"requestId": "r"})).unwrap();
        assert_eq!(
            ev,
            ClientEvent::SessionDecision { request_id: "r".into(), accepted: false, reason: None }
        );
    }

    #[test]
    fn parse_frame_keeps_image_uncapped() {
        let image = "i".repeat(10_000);
        let ev = ClientEvent::parse(
            "remote-host-frame",
            &json!({"sessionId": "s", "image": image, "width": 1920.0, "height": "bad"}),
        )
        .unwrap();
        match ev {
            ClientEvent::HostFrame { image, width, height, .. } => {
                assert_eq!(image.len(), 10_000);
                assert_eq!(width, Some(1920.0));
                assert_eq!(height, None);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parse_unknown_event_is_none() {
        assert!(ClientEvent::parse("self-destruct", &Value::Null).is_none());
        assert!(ClientEvent::parse("", &Value::Null).is_none());
    }

    #[test]
    fn server_event_envelope_shape() {
        let v = serde_json::to_value(ServerEvent::RoomCreated { room_id: "R".into() }).unwrap();
        assert_eq!(v, json!({"event": "room-created", "data": {"roomId": "R"}}));

        let v = serde_json::to_value(ServerEvent::GetUsers {
            room_id: "R".into(),
            participants: vec!["p2".into(), "p1".into()],
        })
        .unwrap();
        assert_eq!(
            v,
            json!({"event": "get-users", "data": {"roomId": "R", "participants": ["p2", "p1"]}})
        );
    }

    #[test]
    fn claimed_event_omits_auto_when_manual() {
        let v = serde_json::to_value(ServerEvent::RemoteHostClaimed {
            host_id: "h".into(),
            room_id: "R".into(),
            auto: false,
        })
        .unwrap();
        assert_eq!(v["data"], json!({"hostId": "h", "roomId": "R"}));

        let v = serde_json::to_value(ServerEvent::RemoteHostClaimed {
            host_id: "h".into(),
            room_id: "R".into(),
            auto: true,
        })
        .unwrap();
        assert_eq!(v["data"]["auto"], json!(true));
    }

    #[test]
    fn session_error_carries_stable_code() {
        let v = serde_json::to_value(ServerEvent::error(ErrorCode::HostOwnerUnclaimed)).unwrap();
        assert_eq!(v["event"], "remote-session-error");
        assert_eq!(v["data"]["code"], "host-owner-unclaimed");
        assert!(v["data"]["message"].as_str().is_some_and(|m| !m.is_empty()));
    }

    #[test]
    fn ended_by_uses_kebab_case() {
        let v = serde_json::to_value(ServerEvent::RemoteSessionEnded {
            session_id: "s".into(),
            host_id: "h".into(),
            ended_by: EndedBy::ControllerDisconnected,
        })
        .unwrap();
        assert_eq!(v["data"]["endedBy"], "controller-disconnected");
    }

    #[test]
    fn frame_serializes_null_dimensions() {
        let v = serde_json::to_value(ServerEvent::RemoteFrame {
            session_id: "s".into(),
            image: "img".into(),
            width: None,
            height: Some(1080.0),
            timestamp: 123.0,
        })
        .unwrap();
        assert_eq!(v["data"]["width"], Value::Null);
        assert_eq!(v["data"]["height"], 1080.0);
    }

    #[test]
    fn setup_result_skips_absent_fields() {
        let v = serde_json::to_value(ServerEvent::RemoteHostSetupResult {
            status: SetupStatus::Timeout,
            request_id: Some("r".into()),
            target_peer_id: None,
            suggested_host_id: None,
            code: None,
            message: None,
        })
        .unwrap();
        assert_eq!(v["data"], json!({"status": "timeout", "requestId": "r"}));
    }
}
