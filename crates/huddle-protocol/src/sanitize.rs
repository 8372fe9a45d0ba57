//! Pure validators and normalizers for user-supplied fields.
//!
//! Every string that reaches a registry key passes through here first.
//! The functions take `serde_json::Value` where the wire shape is untrusted:
//! a non-string where a string is expected sanitizes to empty rather than
//! erroring, matching the drop-silently policy of the event surface.

use serde_json::Value;
use uuid::Uuid;

/// Default cap for sanitized identifier strings.
pub const DEFAULT_MAX_LEN: usize = 128;

/// Cap for host identifiers.
pub const HOST_ID_MAX_LEN: usize = 64;

/// Network identity shared by every loopback peer.
pub const LOOPBACK_NETWORK_ID: &str = "loopback-local";

/// Trim and truncate a JSON value to a string of at most `max_len` chars.
/// Non-strings sanitize to the empty string.
pub fn sanitize_string(v: &Value, max_len: usize) -> String {
    match v.as_str() {
        Some(s) => s.trim().chars().take(max_len).collect(),
        None => String::new(),
    }
}

/// Canonical 8-4-4-4-12 hex form, case-insensitive.
pub fn is_uuid_like(v: &str) -> bool {
    let mut parts = v.split('-');
    for expected in [8usize, 4, 4, 4, 12] {
        match parts.next() {
            Some(p) if p.len() == expected && p.bytes().all(|b| b.is_ascii_hexdigit()) => {}
            _ => return false,
        }
    }
    parts.next().is_none()
}

/// Derive a suggested host id from a peer id: keep `[A-Za-z0-9_-]`, first 20
/// chars, falling back to a fresh UUID prefix when nothing survives.
pub fn build_suggested_host_id(peer_id: &str) -> String {
    let suffix: String = peer_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(20)
        .collect();
    if suffix.is_empty() {
        let fresh = Uuid::new_v4().to_string();
        format!("host-{}", &fresh[..8])
    } else {
        format!("host-{suffix}")
    }
}

/// Strip the IPv4-mapped-IPv6 prefix, if present.
fn strip_mapped_prefix(addr: &str) -> &str {
    addr.strip_prefix("::ffff:").unwrap_or(addr)
}

fn is_loopback(addr: &str) -> bool {
    let addr = strip_mapped_prefix(addr);
    addr == "::1" || addr == "localhost" || addr.starts_with("127.")
}

/// Normalize a remote origin into a network id.
///
/// The first entry of the forwarded-for header wins over the raw peer
/// address; all loopback forms collapse to [`LOOPBACK_NETWORK_ID`] so local
/// agents compare equal during development.
pub fn network_id_from(forwarded_for: Option<&str>, peer_addr: &str) -> String {
    let raw = forwarded_for
        .and_then(|h| h.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(peer_addr);
    if is_loopback(raw) {
        LOOPBACK_NETWORK_ID.to_string()
    } else {
        strip_mapped_prefix(raw).to_string()
    }
}

/// Heuristic: does the network id look like a private or local origin?
///
/// True for the loopback marker, RFC 1918 ranges, link-local, and IPv6 ULA.
pub fn is_likely_private_or_local(network_id: &str) -> bool {
    let id = strip_mapped_prefix(network_id);
    if id == LOOPBACK_NETWORK_ID {
        return true;
    }
    if id.starts_with("10.") || id.starts_with("192.168.") || id.starts_with("169.254.") {
        return true;
    }
    if let Some(rest) = id.strip_prefix("172.") {
        if let Some(second) = rest.split('.').next() {
            if let Ok(n) = second.parse::<u8>() {
                if (16..=31).contains(&n) {
                    return true;
                }
            }
        }
    }
    let lower = id.to_ascii_lowercase();
    lower.starts_with("fc") || lower.starts_with("fd")
}
