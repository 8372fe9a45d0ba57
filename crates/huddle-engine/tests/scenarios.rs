//! End-to-end scenarios driven through the engine's public surface, with
//! channel-backed fake connections standing in for the transport.

use huddle_engine::{ConnectionId, Engine, EngineConfig};
use huddle_protocol::error::ErrorCode;
use huddle_protocol::events::{
    ClientEvent, EndedBy, HostInfo, Ownership, ServerEvent, SetupStatus,
};
use huddle_protocol::input::{PointerButton, RemoteInputEvent};
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver};

struct Client {
    conn: ConnectionId,
    rx: UnboundedReceiver<ServerEvent>,
}

impl Client {
    fn new(engine: &mut Engine, network_id: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = engine.connect(network_id.to_string(), tx);
        Self { conn, rx }
    }

    fn send(&self, engine: &mut Engine, event: ClientEvent) {
        engine.dispatch(self.conn, event);
    }

    fn recv_all(&mut self) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = self.rx.try_recv() {
            out.push(ev);
        }
        out
    }

    /// Drain and return the last hosts list received, if any.
    fn last_hosts_list(&mut self) -> Option<Vec<HostInfo>> {
        self.recv_all().into_iter().rev().find_map(|e| match e {
            ServerEvent::RemoteHostsList { hosts } => Some(hosts),
            _ => None,
        })
    }
}

const NET: &str = "203.0.113.5";

fn join(engine: &mut Engine, client: &Client, room: &str, peer: &str) {
    engine.dispatch(
        client.conn,
        ClientEvent::JoinedRoom { room_id: room.to_string(), peer_id: peer.to_string() },
    );
}

/// Room with an agent-backed host `desk` claimed by `owner`, plus a second
/// participant `driver`. Everything shares one public network origin so the
/// claim's network gate passes and the same-machine block does not trip.
fn claimed_host_fixture(engine: &mut Engine) -> (Client, Client, Client, String) {
    let agent = Client::new(engine, NET);
    let mut owner = Client::new(engine, NET);
    let mut driver = Client::new(engine, NET);

    owner.send(engine, ClientEvent::CreateRoom);
    let room = match owner.recv_all().into_iter().next() {
        Some(ServerEvent::RoomCreated { room_id }) => room_id,
        other => panic!("expected room-created, got {other:?}"),
    };
    join(engine, &owner, &room, "owner");
    join(engine, &driver, &room, "driver");
    agent.send(engine, ClientEvent::HostRegister { host_id: "desk".into() });
    owner.send(engine, ClientEvent::HostClaim { host_id: "desk".into() });
    owner.recv_all();
    driver.recv_all();
    (agent, owner, driver, room)
}

fn start_session(engine: &mut Engine, owner: &mut Client, driver: &mut Client) -> String {
    driver.send(engine, ClientEvent::SessionRequest { host_id: "desk".into() });
    let request_id = owner
        .recv_all()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::RemoteSessionRequestedUi { request_id, .. } => Some(request_id),
            _ => None,
        })
        .expect("approver receives the consent prompt");
    owner.send(engine, ClientEvent::SessionDecision { request_id, accepted: true, reason: None });
    driver
        .recv_all()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::RemoteSessionStarted { session_id, .. } => Some(session_id),
            _ => None,
        })
        .expect("controller receives remote-session-started")
}

#[test]
fn two_party_room_join_sequence() {
    let mut engine = Engine::new(EngineConfig::default());
    let mut c1 = Client::new(&mut engine, NET);
    let mut c2 = Client::new(&mut engine, NET);

    c1.send(&mut engine, ClientEvent::CreateRoom);
    let room = match c1.recv_all().into_iter().next() {
        Some(ServerEvent::RoomCreated { room_id }) => room_id,
        other => panic!("expected room-created, got {other:?}"),
    };

    // C2 announces first; the creator has no peer id yet.
    join(&mut engine, &c2, &room, "p2");
    assert_eq!(
        c2.recv_all(),
        vec![ServerEvent::GetUsers { room_id: room.clone(), participants: vec!["p2".into()] }]
    );

    join(&mut engine, &c1, &room, "p1");
    assert_eq!(
        c1.recv_all(),
        vec![ServerEvent::GetUsers {
            room_id: room.clone(),
            participants: vec!["p2".into(), "p1".into()],
        }]
    );

    c1.send(&mut engine, ClientEvent::Ready);
    assert_eq!(c2.recv_all(), vec![ServerEvent::UserJoined { peer_id: "p1".into() }]);
    assert!(c1.recv_all().is_empty(), "ready must not echo back to the caller");
}

#[test]
fn happy_path_remote_session() {
    let mut engine = Engine::new(EngineConfig::default());
    let (mut agent, mut owner, mut driver, _room) = claimed_host_fixture(&mut engine);

    driver.send(&mut engine, ClientEvent::SessionRequest { host_id: "desk".into() });
    assert!(driver
        .recv_all()
        .iter()
        .any(|e| matches!(e, ServerEvent::RemoteSessionPending { .. })));
    let request_id = owner
        .recv_all()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::RemoteSessionRequestedUi { request_id, host_id, .. } => {
                assert_eq!(host_id, "desk");
                Some(request_id)
            }
            _ => None,
        })
        .expect("approver receives remote-session-requested-ui");

    owner.send(&mut engine, ClientEvent::SessionDecision { request_id, accepted: true, reason: None });
    let session_id = driver
        .recv_all()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::RemoteSessionStarted { session_id, host_id } => {
                assert_eq!(host_id, "desk");
                Some(session_id)
            }
            _ => None,
        })
        .expect("controller receives remote-session-started");
    assert!(agent.recv_all().iter().any(|e| matches!(
        e,
        ServerEvent::RemoteSessionStarted { session_id: s, .. } if *s == session_id
    )));

    // Frame flows host -> controller.
    agent.send(
        &mut engine,
        ClientEvent::HostFrame {
            session_id: session_id.clone(),
            image: "...data...".into(),
            width: Some(1280.0),
            height: Some(720.0),
            timestamp: Some(42.0),
        },
    );
    assert_eq!(
        driver.recv_all(),
        vec![ServerEvent::RemoteFrame {
            session_id: session_id.clone(),
            image: "...data...".into(),
            width: Some(1280.0),
            height: Some(720.0),
            timestamp: 42.0,
        }]
    );

    // Input flows controller -> host, clamped.
    driver.send(
        &mut engine,
        ClientEvent::RemoteInput {
            session_id: session_id.clone(),
            event: json!({"type": "move", "x": 0.5, "y": 0.5}),
        },
    );
    assert_eq!(
        agent.recv_all(),
        vec![ServerEvent::RemoteInput {
            session_id,
            event: RemoteInputEvent::Move { x: 0.5, y: 0.5 },
        }]
    );
}

#[test]
fn session_request_without_claim_is_rejected() {
    let mut engine = Engine::new(EngineConfig::default());
    let agent = Client::new(&mut engine, NET);
    let mut driver = Client::new(&mut engine, NET);
    let mut owner = Client::new(&mut engine, NET);

    owner.send(&mut engine, ClientEvent::CreateRoom);
    let room = match owner.recv_all().into_iter().next() {
        Some(ServerEvent::RoomCreated { room_id }) => room_id,
        other => panic!("unexpected: {other:?}"),
    };
    join(&mut engine, &driver, &room, "driver");
    agent.send(&mut engine, ClientEvent::HostRegister { host_id: "desk".into() });
    driver.recv_all();

    driver.send(&mut engine, ClientEvent::SessionRequest { host_id: "desk".into() });
    assert_eq!(
        driver.recv_all(),
        vec![ServerEvent::error(ErrorCode::HostOwnerUnclaimed)]
    );
    assert_eq!(engine.pending_request_count(), 0, "no pending record may be created");
}

#[test]
fn controller_disconnect_cascades_to_host() {
    let mut engine = Engine::new(EngineConfig::default());
    let (mut agent, mut owner, mut driver, _room) = claimed_host_fixture(&mut engine);
    let session_id = start_session(&mut engine, &mut owner, &mut driver);
    agent.recv_all();

    engine.disconnect(driver.conn);

    let events = agent.recv_all();
    assert!(events.contains(&ServerEvent::RemoteSessionEnded {
        session_id,
        host_id: "desk".into(),
        ended_by: EndedBy::ControllerDisconnected,
    }));
    let hosts = events
        .into_iter()
        .rev()
        .find_map(|e| match e {
            ServerEvent::RemoteHostsList { hosts } => Some(hosts),
            _ => None,
        })
        .expect("hosts list rebroadcast after session end");
    assert_eq!(hosts.len(), 1);
    assert!(!hosts[0].busy, "host must not stay busy after the cascade");
    assert_eq!(engine.session_count(), 0);
}

#[test]
fn host_disconnect_cascades_to_controller() {
    let mut engine = Engine::new(EngineConfig::default());
    let (agent, mut owner, mut driver, _room) = claimed_host_fixture(&mut engine);
    let session_id = start_session(&mut engine, &mut owner, &mut driver);

    engine.disconnect(agent.conn);

    let events = driver.recv_all();
    assert!(events.contains(&ServerEvent::RemoteSessionEnded {
        session_id,
        host_id: "desk".into(),
        ended_by: EndedBy::HostDisconnected,
    }));
    assert_eq!(engine.host_count(), 0, "registry entry removed with the agent");
    assert_eq!(engine.session_count(), 0);
}

#[test]
fn approver_disconnect_cancels_pending_request() {
    let mut engine = Engine::new(EngineConfig::default());
    let (_agent, owner, mut driver, _room) = claimed_host_fixture(&mut engine);
    driver.send(&mut engine, ClientEvent::SessionRequest { host_id: "desk".into() });
    driver.recv_all();

    engine.disconnect(owner.conn);
    assert!(driver
        .recv_all()
        .contains(&ServerEvent::error(ErrorCode::ApproverDisconnected)));
    assert_eq!(engine.pending_request_count(), 0);
}

#[test]
fn duplicate_host_id_rejected_until_agent_leaves() {
    let mut engine = Engine::new(EngineConfig::default());
    let mut a1 = Client::new(&mut engine, NET);
    let mut a2 = Client::new(&mut engine, "198.51.100.9");

    a1.send(&mut engine, ClientEvent::HostRegister { host_id: "H".into() });
    assert!(a1
        .recv_all()
        .contains(&ServerEvent::RemoteHostRegistered { host_id: "H".into() }));

    a2.send(&mut engine, ClientEvent::HostRegister { host_id: "H".into() });
    assert_eq!(a2.recv_all(), vec![ServerEvent::error(ErrorCode::HostIdInUse)]);

    engine.disconnect(a1.conn);
    a2.recv_all();
    a2.send(&mut engine, ClientEvent::HostRegister { host_id: "H".into() });
    assert!(a2
        .recv_all()
        .contains(&ServerEvent::RemoteHostRegistered { host_id: "H".into() }));
}

#[test]
fn host_setup_accept_then_registration_auto_claims() {
    let mut engine = Engine::new(EngineConfig::default());
    let mut requester = Client::new(&mut engine, NET);
    let mut target = Client::new(&mut engine, NET);

    requester.send(&mut engine, ClientEvent::CreateRoom);
    let room = match requester.recv_all().into_iter().next() {
        Some(ServerEvent::RoomCreated { room_id }) => room_id,
        other => panic!("unexpected: {other:?}"),
    };
    join(&mut engine, &requester, &room, "p1");
    join(&mut engine, &target, &room, "p2");
    requester.recv_all();
    target.recv_all();

    requester.send(&mut engine, ClientEvent::HostSetupRequest { target_peer_id: Some("p2".into()) });
    let pending = requester
        .recv_all()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::RemoteHostSetupPending { request_id, suggested_host_id, .. } => {
                Some((request_id, suggested_host_id))
            }
            _ => None,
        })
        .expect("requester sees the pending setup");
    assert_eq!(pending.1, "host-p2");
    let request_id = target
        .recv_all()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::RemoteHostSetupRequested { request_id, requester_peer_id, .. } => {
                assert_eq!(requester_peer_id, "p1");
                Some(request_id)
            }
            _ => None,
        })
        .expect("target sees the setup request");

    target.send(&mut engine, ClientEvent::HostSetupDecision { request_id, accepted: true });
    assert!(requester.recv_all().iter().any(|e| matches!(
        e,
        ServerEvent::RemoteHostSetupResult { status: SetupStatus::Accepted, .. }
    )));

    // The agent comes online under the suggested id from the target's
    // network origin; the target is claimed without sending a claim.
    let agent = Client::new(&mut engine, NET);
    agent.send(&mut engine, ClientEvent::HostRegister { host_id: "host-p2".into() });
    assert!(target.recv_all().contains(&ServerEvent::RemoteHostClaimed {
        host_id: "host-p2".into(),
        room_id: room,
        auto: true,
    }));
    assert_eq!(engine.claim_count(), 1);

    // The assignment is consumed: a second registration must not re-claim.
    engine.disconnect(agent.conn);
    target.recv_all();
    let agent2 = Client::new(&mut engine, NET);
    agent2.send(&mut engine, ClientEvent::HostRegister { host_id: "host-p2".into() });
    assert!(
        !target
            .recv_all()
            .iter()
            .any(|e| matches!(e, ServerEvent::RemoteHostClaimed { auto: true, .. })),
        "assignment must be cleared after first use"
    );
}

#[test]
fn setup_rejection_reaches_requester() {
    let mut engine = Engine::new(EngineConfig::default());
    let mut requester = Client::new(&mut engine, NET);
    let mut target = Client::new(&mut engine, NET);
    let room = uuid::Uuid::new_v4().to_string();
    join(&mut engine, &requester, &room, "p1");
    join(&mut engine, &target, &room, "p2");
    requester.recv_all();
    target.recv_all();

    requester.send(&mut engine, ClientEvent::HostSetupRequest { target_peer_id: None });
    requester.recv_all();
    let request_id = target
        .recv_all()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::RemoteHostSetupRequested { request_id, .. } => Some(request_id),
            _ => None,
        })
        .expect("target sees the request");

    // Only the target may decide; the requester's own decision is ignored.
    requester.send(
        &mut engine,
        ClientEvent::HostSetupDecision { request_id: request_id.clone(), accepted: true },
    );
    assert!(requester.recv_all().is_empty());

    target.send(&mut engine, ClientEvent::HostSetupDecision { request_id, accepted: false });
    assert!(requester.recv_all().iter().any(|e| matches!(
        e,
        ServerEvent::RemoteHostSetupResult { status: SetupStatus::Rejected, .. }
    )));
}

#[test]
fn setup_request_target_resolution_errors() {
    let mut engine = Engine::new(EngineConfig::default());
    let mut alone = Client::new(&mut engine, NET);
    let room = uuid::Uuid::new_v4().to_string();
    join(&mut engine, &alone, &room, "p1");
    alone.recv_all();

    // Nobody else in the room.
    alone.send(&mut engine, ClientEvent::HostSetupRequest { target_peer_id: None });
    assert!(alone.recv_all().iter().any(|e| matches!(
        e,
        ServerEvent::RemoteHostSetupResult {
            status: SetupStatus::Error,
            code: Some(ErrorCode::ParticipantNotFound),
            ..
        }
    )));

    // Two candidates and no target named.
    let mut b = Client::new(&mut engine, NET);
    let mut c = Client::new(&mut engine, NET);
    join(&mut engine, &b, &room, "p2");
    join(&mut engine, &c, &room, "p3");
    b.recv_all();
    c.recv_all();
    alone.send(&mut engine, ClientEvent::HostSetupRequest { target_peer_id: None });
    assert!(alone.recv_all().iter().any(|e| matches!(
        e,
        ServerEvent::RemoteHostSetupResult {
            status: SetupStatus::Error,
            code: Some(ErrorCode::ParticipantRequired),
            ..
        }
    )));

    // A named stranger.
    alone.send(
        &mut engine,
        ClientEvent::HostSetupRequest { target_peer_id: Some("nobody".into()) },
    );
    assert!(alone.recv_all().iter().any(|e| matches!(
        e,
        ServerEvent::RemoteHostSetupResult {
            status: SetupStatus::Error,
            code: Some(ErrorCode::ParticipantNotFound),
            ..
        }
    )));
}

#[test]
fn same_machine_request_is_blocked_unless_allowed() {
    for (allow, expect_blocked) in [(false, true), (true, false)] {
        let mut engine =
            Engine::new(EngineConfig { allow_same_machine: allow, ..Default::default() });
        let agent = Client::new(&mut engine, "loopback-local");
        let mut owner = Client::new(&mut engine, "loopback-local");
        let mut driver = Client::new(&mut engine, "loopback-local");
        let room = uuid::Uuid::new_v4().to_string();
        join(&mut engine, &owner, &room, "owner");
        join(&mut engine, &driver, &room, "driver");
        agent.send(&mut engine, ClientEvent::HostRegister { host_id: "desk".into() });
        owner.send(&mut engine, ClientEvent::HostClaim { host_id: "desk".into() });
        owner.recv_all();
        driver.recv_all();

        driver.send(&mut engine, ClientEvent::SessionRequest { host_id: "desk".into() });
        let events = driver.recv_all();
        let blocked = events.contains(&ServerEvent::error(ErrorCode::SelfHostMachineBlocked));
        assert_eq!(blocked, expect_blocked, "allow_same_machine={allow}");
    }
}

#[test]
fn busy_and_pending_guards() {
    let mut engine = Engine::new(EngineConfig::default());
    let (_agent, mut owner, mut driver, room) = claimed_host_fixture(&mut engine);
    let mut second = Client::new(&mut engine, NET);
    join(&mut engine, &second, &room, "second");
    let agent2 = Client::new(&mut engine, NET);
    agent2.send(&mut engine, ClientEvent::HostRegister { host_id: "desk2".into() });
    owner.send(&mut engine, ClientEvent::HostClaim { host_id: "desk2".into() });
    second.recv_all();

    driver.send(&mut engine, ClientEvent::SessionRequest { host_id: "desk".into() });
    driver.recv_all();

    // Anyone else asking for the same host hits the per-host pending guard,
    // including the original requester.
    second.send(&mut engine, ClientEvent::SessionRequest { host_id: "desk".into() });
    assert_eq!(second.recv_all(), vec![ServerEvent::error(ErrorCode::HostPending)]);
    driver.send(&mut engine, ClientEvent::SessionRequest { host_id: "desk".into() });
    assert_eq!(driver.recv_all(), vec![ServerEvent::error(ErrorCode::HostPending)]);

    // A request for a different host trips the requester's own guard.
    driver.send(&mut engine, ClientEvent::SessionRequest { host_id: "desk2".into() });
    assert_eq!(driver.recv_all(), vec![ServerEvent::error(ErrorCode::ControllerPending)]);

    let request_id = owner
        .recv_all()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::RemoteSessionRequestedUi { request_id, .. } => Some(request_id),
            _ => None,
        })
        .expect("consent prompt");
    owner.send(&mut engine, ClientEvent::SessionDecision { request_id, accepted: true, reason: None });
    driver.recv_all();

    // Host is now busy for everyone else.
    second.send(&mut engine, ClientEvent::SessionRequest { host_id: "desk".into() });
    assert_eq!(second.recv_all(), vec![ServerEvent::error(ErrorCode::HostBusy)]);
}

#[test]
fn rejection_carries_reason_to_controller() {
    let mut engine = Engine::new(EngineConfig::default());
    let (_agent, mut owner, mut driver, _room) = claimed_host_fixture(&mut engine);
    driver.send(&mut engine, ClientEvent::SessionRequest { host_id: "desk".into() });
    driver.recv_all();
    let request_id = owner
        .recv_all()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::RemoteSessionRequestedUi { request_id, .. } => Some(request_id),
            _ => None,
        })
        .expect("consent prompt");

    owner.send(
        &mut engine,
        ClientEvent::SessionDecision {
            request_id,
            accepted: false,
            reason: Some("not now".into()),
        },
    );
    assert_eq!(
        driver.recv_all(),
        vec![ServerEvent::RemoteSessionError {
            code: ErrorCode::RequestRejected,
            message: "not now".into(),
        }]
    );
    assert_eq!(engine.pending_request_count(), 0);
}

#[test]
fn decision_by_stranger_is_ignored() {
    let mut engine = Engine::new(EngineConfig::default());
    let (_agent, mut owner, mut driver, room) = claimed_host_fixture(&mut engine);
    let mut stranger = Client::new(&mut engine, NET);
    join(&mut engine, &stranger, &room, "stranger");
    stranger.recv_all();

    driver.send(&mut engine, ClientEvent::SessionRequest { host_id: "desk".into() });
    driver.recv_all();
    let request_id = owner
        .recv_all()
        .into_iter()
        .find_map(|e| match e {
            ServerEvent::RemoteSessionRequestedUi { request_id, .. } => Some(request_id),
            _ => None,
        })
        .expect("consent prompt");

    stranger.send(
        &mut engine,
        ClientEvent::SessionDecision { request_id, accepted: true, reason: None },
    );
    assert_eq!(engine.pending_request_count(), 1, "stranger decisions are ignored");
    assert!(driver.recv_all().is_empty());
}

#[test]
fn self_request_of_own_claim_is_blocked() {
    let mut engine = Engine::new(EngineConfig::default());
    let (_agent, mut owner, _driver, _room) = claimed_host_fixture(&mut engine);
    owner.send(&mut engine, ClientEvent::SessionRequest { host_id: "desk".into() });
    assert_eq!(
        owner.recv_all(),
        vec![ServerEvent::error(ErrorCode::SelfHostRequestBlocked)]
    );
}

#[test]
fn stop_is_idempotent_and_authorized() {
    let mut engine = Engine::new(EngineConfig::default());
    let (mut agent, mut owner, mut driver, _room) = claimed_host_fixture(&mut engine);
    let session_id = start_session(&mut engine, &mut owner, &mut driver);
    agent.recv_all();

    driver.send(&mut engine, ClientEvent::SessionStop { session_id: Some(session_id.clone()) });
    assert!(agent.recv_all().contains(&ServerEvent::RemoteSessionEnded {
        session_id: session_id.clone(),
        host_id: "desk".into(),
        ended_by: EndedBy::Controller,
    }));

    // Stopping again is a no-op.
    driver.recv_all();
    driver.send(&mut engine, ClientEvent::SessionStop { session_id: Some(session_id) });
    assert!(driver.recv_all().is_empty());
    assert_eq!(engine.session_count(), 0);
}

#[test]
fn hosts_list_reflects_busy_transitions() {
    let mut engine = Engine::new(EngineConfig::default());
    let (mut agent, mut owner, mut driver, _room) = claimed_host_fixture(&mut engine);
    let session_id = start_session(&mut engine, &mut owner, &mut driver);

    assert_eq!(
        owner.last_hosts_list(),
        Some(vec![HostInfo { host_id: "desk".into(), busy: true, ownership: Ownership::You }])
    );

    agent.send(&mut engine, ClientEvent::SessionStop { session_id: Some(session_id) });
    assert_eq!(
        owner.last_hosts_list(),
        Some(vec![HostInfo { host_id: "desk".into(), busy: false, ownership: Ownership::You }])
    );
}

#[test]
fn input_boundaries_clamp_and_drop() {
    let mut engine = Engine::new(EngineConfig::default());
    let (mut agent, mut owner, mut driver, _room) = claimed_host_fixture(&mut engine);
    let session_id = start_session(&mut engine, &mut owner, &mut driver);
    agent.recv_all();

    driver.send(
        &mut engine,
        ClientEvent::RemoteInput {
            session_id: session_id.clone(),
            event: json!({"type": "move", "x": 1.5, "y": 0.5}),
        },
    );
    assert_eq!(
        agent.recv_all(),
        vec![ServerEvent::RemoteInput {
            session_id: session_id.clone(),
            event: RemoteInputEvent::Move { x: 1.0, y: 0.5 },
        }]
    );

    driver.send(
        &mut engine,
        ClientEvent::RemoteInput {
            session_id: session_id.clone(),
            event: json!({"type": "teleport", "x": 0.1, "y": 0.1}),
        },
    );
    assert!(agent.recv_all().is_empty(), "unknown input types are dropped silently");

    driver.send(
        &mut engine,
        ClientEvent::RemoteInput {
            session_id,
            event: json!({"type": "mouse-down", "x": 0.2, "y": 0.2, "button": "middle"}),
        },
    );
    assert!(agent.recv_all().iter().any(|e| matches!(
        e,
        ServerEvent::RemoteInput {
            event: RemoteInputEvent::MouseDown { button: PointerButton::Middle, .. },
            ..
        }
    )));
}

#[test]
fn registries_are_clean_after_everyone_disconnects() {
    let mut engine = Engine::new(EngineConfig::default());
    let (mut agent, mut owner, mut driver, room) = claimed_host_fixture(&mut engine);
    let _session = start_session(&mut engine, &mut owner, &mut driver);

    for client in [&mut agent, &mut owner, &mut driver] {
        engine.disconnect(client.conn);
    }
    assert_eq!(engine.connection_count(), 0);
    assert_eq!(engine.session_count(), 0);
    assert_eq!(engine.host_count(), 0);
    assert_eq!(engine.claim_count(), 0);
    assert_eq!(engine.pending_request_count(), 0);
    assert!(!engine.has_room(&room), "no ghost rooms after full teardown");
}
