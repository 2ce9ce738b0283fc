//! RoomLink chat engine
//!
//! Client-side conversation & message synchronization for the RoomLink
//! student-housing marketplace:
//! - single supervised WebSocket push channel with presence announce
//! - per-conversation message log with dedup fold-in and stale-fetch
//!   rejection
//! - recency-sorted inbox directory with unread bookkeeping
//! - two-phase send pipeline: persist over REST, then broadcast
//!
//! The [`engine::ChatEngine`] facade composes everything; `roomchat`
//! (`src/main.rs`) is a thin terminal client on top of it.

pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod rest;
pub mod session;
pub mod store;
pub mod transport;

pub use engine::ChatEngine;
pub use error::ChatError;
pub use models::{ConversationSummary, Message};
pub use session::{SessionIdentity, UserRole};

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct YamlConfig {
    pub api: ApiYamlConfig,
    pub socket: SocketYamlConfig,
}

/// REST configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiYamlConfig {
    pub url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiYamlConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/api".into(),
            token: None,
            timeout_secs: 30,
        }
    }
}

/// Push-channel configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SocketYamlConfig {
    pub url: String,
    pub reconnect_delay_secs: u64,
    pub ping_interval_secs: u64,
}

impl Default for SocketYamlConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".into(),
            reconnect_delay_secs: 5,
            ping_interval_secs: 30,
        }
    }
}

// ============================================================================
// Runtime config
// ============================================================================

/// Engine configuration.
///
/// Priority: environment variables override YAML, YAML overrides built-in
/// defaults. All environment variables are prefixed `ROOMLINK_`.
#[derive(Debug, Clone)]
pub struct Config {
    /// REST base URL (ROOMLINK_API_URL)
    pub api_url: String,
    /// Bearer token for REST calls (ROOMLINK_API_TOKEN)
    pub api_token: Option<String>,
    /// Per-request HTTP timeout (ROOMLINK_API_TIMEOUT_SECS)
    pub request_timeout: Duration,
    /// WebSocket endpoint (ROOMLINK_SOCKET_URL)
    pub socket_url: String,
    /// Delay between re-dial attempts (ROOMLINK_RECONNECT_SECS)
    pub reconnect_delay: Duration,
    /// Keepalive ping interval (ROOMLINK_PING_SECS)
    pub ping_interval: Duration,
}

impl Config {
    /// Load from environment variables over built-in defaults, reading
    /// `roomlink.yaml` in the working directory when present.
    pub fn from_env() -> Self {
        Self::from_yaml_and_env(None)
    }

    /// Load with an explicit YAML path. Environment variables still win.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Self {
        let yaml = Self::load_yaml(yaml_path);

        Self {
            api_url: std::env::var("ROOMLINK_API_URL").unwrap_or(yaml.api.url),
            api_token: std::env::var("ROOMLINK_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty())
                .or(yaml.api.token),
            request_timeout: Duration::from_secs(
                std::env::var("ROOMLINK_API_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(yaml.api.timeout_secs),
            ),
            socket_url: std::env::var("ROOMLINK_SOCKET_URL").unwrap_or(yaml.socket.url),
            reconnect_delay: Duration::from_secs(
                std::env::var("ROOMLINK_RECONNECT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(yaml.socket.reconnect_delay_secs),
            ),
            ping_interval: Duration::from_secs(
                std::env::var("ROOMLINK_PING_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(yaml.socket.ping_interval_secs),
            ),
        }
    }

    fn load_yaml(path: Option<&Path>) -> YamlConfig {
        let path = path.unwrap_or_else(|| Path::new("roomlink.yaml"));
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str::<YamlConfig>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded YAML config");
                    config
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to parse YAML config, using defaults"
                    );
                    YamlConfig::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "no YAML config file found, using defaults");
                YamlConfig::default()
            }
        }
    }
}
