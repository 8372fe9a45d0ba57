//! Pointer and key event model for the remote-control input relay.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sanitize::sanitize_string;

const KEY_MAX_LEN: usize = 64;

/// Mouse button on pointer events. Unknown values default to `Left`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

/// A normalized input event forwarded host-bound.
///
/// Pointer coordinates are fractions of the host screen clamped to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RemoteInputEvent {
    Move {
        x: f64,
        y: f64,
    },
    Click {
        x: f64,
        y: f64,
        button: PointerButton,
    },
    MouseDown {
        x: f64,
        y: f64,
        button: PointerButton,
    },
    MouseUp {
        x: f64,
        y: f64,
        button: PointerButton,
    },
    #[serde(rename_all = "camelCase")]
    Wheel {
        x: f64,
        y: f64,
        delta_x: f64,
        delta_y: f64,
    },
    KeyDown {
        key: String,
        code: String,
        repeat: bool,
    },
    KeyUp {
        key: String,
        code: String,
        repeat: bool,
    },
}

fn finite(v: &Value, field: &str) -> Option<f64> {
    v.get(field).and_then(Value::as_f64).filter(|n| n.is_finite())
}

fn clamped_xy(v: &Value) -> Option<(f64, f64)> {
    let x = finite(v, "x")?.clamp(0.0, 1.0);
    let y = finite(v, "y")?.clamp(0.0, 1.0);
    Some((x, y))
}

fn button(v: &Value) -> PointerButton {
    match v.get("button").and_then(Value::as_str) {
        Some("right") => PointerButton::Right,
        Some("middle") => PointerButton::Middle,
        _ => PointerButton::Left,
    }
}

/// Validate an untrusted input event and return its normalized shape, or
/// `None` when the event must be dropped.
pub fn sanitize_remote_event(event: &Value) -> Option<RemoteInputEvent> {
    match event.get("type").and_then(Value::as_str)? {
        "move" => {
            let (x, y) = clamped_xy(event)?;
            Some(RemoteInputEvent::Move { x, y })
        }
        "click" => {
            let (x, y) = clamped_xy(event)?;
            Some(RemoteInputEvent::Click { x, y, button: button(event) })
        }
        "mouse-down" => {
            let (x, y) = clamped_xy(event)?;
            Some(RemoteInputEvent::MouseDown { x, y, button: button(event) })
        }
        "mouse-up" => {
            let (x, y) = clamped_xy(event)?;
            Some(RemoteInputEvent::MouseUp { x, y, button: button(event) })
        }
        "wheel" => {
            let (x, y) = clamped_xy(event)?;
            let delta_x = finite(event, "deltaX").unwrap_or(0.0);
            let delta_y = finite(event, "deltaY").unwrap_or(0.0);
            Some(RemoteInputEvent::Wheel { x, y, delta_x, delta_y })
        }
        kind @ ("key-down" | "key-up") => {
            let key = sanitize_string(event.get("key").unwrap_or(&Value::Null), KEY_MAX_LEN);
            let code = sanitize_string(event.get("code").unwrap_or(&Value::Null), KEY_MAX_LEN);
            if key.is_empty() && code.is_empty() {
                return None;
            }
            let repeat = event.get("repeat").and_then(Value::as_bool).unwrap_or(false);
            if kind == "key-down" {
                Some(RemoteInputEvent::KeyDown { key, code, repeat })
            } else {
                Some(RemoteInputEvent::KeyUp { key, code, repeat })
            }
        }
        _ => None,
    }
}
