//! Stable error-code vocabulary.
//!
//! Codes are part of the wire contract: clients select UX by `code`, the
//! `message` is only human-readable. New failure modes must reuse an
//! existing code rather than invent one.

use serde::{Deserialize, Serialize};

/// Error codes emitted on `remote-session-error` or inlined in
/// `remote-host-setup-result` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Operation needs an active room.
    #[error("join a room first")]
    RoomRequired,
    /// Host id missing from the request.
    #[error("host id is required")]
    HostRequired,
    /// No such host id is registered.
    #[error("host not found")]
    HostNotFound,
    /// Host id known but its agent connection is gone.
    #[error("host is offline")]
    HostOffline,
    /// Duplicate registration by a different live agent.
    #[error("host id is already in use")]
    HostIdInUse,
    /// Host already bound to an active session.
    #[error("host is busy in another session")]
    HostBusy,
    /// Host already has a pending consent request.
    #[error("host already has a pending request")]
    HostPending,
    /// Requester is already controlling another host.
    #[error("you already have an active remote session")]
    ControllerBusy,
    /// Requester already has a pending request.
    #[error("you already have a pending request")]
    ControllerPending,
    /// No claim exists to authorize the request.
    #[error("nobody in your room has claimed this host")]
    HostOwnerUnclaimed,
    /// Another room member already holds the claim.
    #[error("host is claimed by another participant")]
    HostClaimedByOther,
    /// A host-setup assignment reserves the claim for someone else.
    #[error("host is assigned to another participant")]
    HostClaimAssignedOther,
    /// Claimer and host agent are on different network origins.
    #[error("host must be claimed from its own network")]
    HostClaimOwnerMismatch,
    /// Requester would be approving its own request.
    #[error("you cannot request your own host")]
    SelfHostRequestBlocked,
    /// Requester and host appear to be the same machine.
    #[error("remote control of the same machine is blocked")]
    SelfHostMachineBlocked,
    /// Approver declined the request.
    #[error("request was rejected")]
    RequestRejected,
    /// Requester withdrew the request.
    #[error("request was cancelled")]
    RequestCancelled,
    /// Consent window elapsed without a decision.
    #[error("request timed out")]
    RequestTimeout,
    /// Host agent connection dropped.
    #[error("host disconnected")]
    HostDisconnected,
    /// Controller connection dropped.
    #[error("controller disconnected")]
    ControllerDisconnected,
    /// Claim holder dropped before deciding.
    #[error("approver disconnected")]
    ApproverDisconnected,
    /// Multiple candidates, target peer must be named.
    #[error("a target participant is required")]
    ParticipantRequired,
    /// Named target is not in the room.
    #[error("participant not found")]
    ParticipantNotFound,
    /// Target resolves to the requester itself.
    #[error("invalid target participant")]
    ParticipantInvalid,
}

impl ErrorCode {
    /// Wire name of the code (kebab-case, matches the serde rename).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoomRequired => "room-required",
            Self::HostRequired => "host-required",
            Self::HostNotFound => "host-not-found",
            Self::HostOffline => "host-offline",
            Self::HostIdInUse => "host-id-in-use",
            Self::HostBusy => "host-busy",
            Self::HostPending => "host-pending",
            Self::ControllerBusy => "controller-busy",
            Self::ControllerPending => "controller-pending",
            Self::HostOwnerUnclaimed => "host-owner-unclaimed",
            Self::HostClaimedByOther => "host-claimed-by-other",
            Self::HostClaimAssignedOther => "host-claim-assigned-other",
            Self::HostClaimOwnerMismatch => "host-claim-owner-mismatch",
            Self::SelfHostRequestBlocked => "self-host-request-blocked",
            Self::SelfHostMachineBlocked => "self-host-machine-blocked",
            Self::RequestRejected => "request-rejected",
            Self::RequestCancelled => "request-cancelled",
            Self::RequestTimeout => "request-timeout",
            Self::HostDisconnected => "host-disconnected",
            Self::ControllerDisconnected => "controller-disconnected",
            Self::ApproverDisconnected => "approver-disconnected",
            Self::ParticipantRequired => "participant-required",
            Self::ParticipantNotFound => "participant-not-found",
            Self::ParticipantInvalid => "participant-invalid",
        }
    }

    /// Default human-readable message for the code.
    pub fn default_message(self) -> String {
        self.to_string()
    }
}
