//! Server configuration from flags and environment variables.

use std::path::PathBuf;

use clap::Parser;
use huddle_engine::EngineConfig;

/// Huddle signaling server configuration. Every flag can also be supplied
/// through the environment variable named after it.
#[derive(Debug, Clone, Parser)]
#[command(name = "huddle-server", about = "Huddle signaling server", version)]
pub struct ServerConfig {
    /// Listening port
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Comma-separated CORS allow-list; `*` allows any origin
    #[arg(
        long,
        env = "CORS_ORIGINS",
        default_value = "http://localhost:5173,http://127.0.0.1:5173"
    )]
    pub cors_origins: String,

    /// Shared admission token required at handshake when set
    #[arg(long, env = "REMOTE_CONTROL_TOKEN")]
    pub remote_control_token: Option<String>,

    /// Set to "0" to disable auto-creation of UUID-shaped rooms on join
    #[arg(long, env = "ROOM_AUTO_CREATE_ON_JOIN", default_value = "1")]
    pub room_auto_create_on_join: String,

    /// Set to "1" to allow remote control between peers on the same machine
    #[arg(long, env = "ALLOW_SAME_MACHINE_REMOTE", default_value = "0")]
    pub allow_same_machine_remote: String,

    /// Set to "1" to log per-session traffic counters every two seconds
    #[arg(long, env = "REMOTE_DEBUG", default_value = "0")]
    pub remote_debug: String,

    /// Local zip streamed from /downloads/host-app-win.zip
    #[arg(long, env = "HOST_APP_ZIP")]
    pub host_app_zip: Option<PathBuf>,
}

impl ServerConfig {
    /// The admission token, trimmed; an empty or whitespace-only token
    /// disables the gate.
    pub fn admission_token(&self) -> Option<String> {
        self.remote_control_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
    }

    pub fn auto_create_rooms(&self) -> bool {
        self.room_auto_create_on_join != "0"
    }

    pub fn allow_same_machine(&self) -> bool {
        self.allow_same_machine_remote == "1"
    }

    pub fn debug_traffic(&self) -> bool {
        self.remote_debug == "1"
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            auto_create_rooms: self.auto_create_rooms(),
            allow_same_machine: self.allow_same_machine(),
        }
    }
}
