//! Server configuration.
//!
//! Loaded from environment variables. The TURN credential is redacted in
//! Debug output.

use crate::engine::EngineConfig;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use switchboard_core::IceServerConfig;
use thiserror::Error;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

pub const DEFAULT_ICE_SERVERS: &str = "stun:stun.l.google.com:19302";

/// How long a callee has to answer `incomingCall`.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

pub const DEFAULT_ROOM_CHANNEL_CAPACITY: usize = 100;

pub const DEFAULT_ROOM: &str = "default";

#[derive(Clone)]
pub struct Config {
    /// HTTP/WebSocket bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// STUN/TURN urls handed to the media engine.
    pub ice_servers: Vec<String>,

    pub turn_username: Option<String>,

    pub turn_credential: Option<String>,

    pub call_timeout_ms: u64,

    /// Bound of each room's command queue.
    pub room_channel_capacity: usize,

    /// Room used when a registration names none.
    pub default_room: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("ice_servers", &self.ice_servers)
            .field("turn_username", &self.turn_username)
            .field(
                "turn_credential",
                &self.turn_credential.as_ref().map(|_| "[REDACTED]"),
            )
            .field("call_timeout_ms", &self.call_timeout_ms)
            .field("room_channel_capacity", &self.room_channel_capacity)
            .field("default_room", &self.default_room)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            ice_servers: vec![DEFAULT_ICE_SERVERS.to_string()],
            turn_username: None,
            turn_credential: None,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            room_channel_capacity: DEFAULT_ROOM_CHANNEL_CAPACITY,
            default_room: DEFAULT_ROOM.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("SWITCHBOARD_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let ice_servers = vars
            .get("SWITCHBOARD_ICE_SERVERS")
            .map(String::as_str)
            .unwrap_or(DEFAULT_ICE_SERVERS)
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();

        let turn_username = vars.get("SWITCHBOARD_TURN_USERNAME").cloned();
        let turn_credential = vars.get("SWITCHBOARD_TURN_CREDENTIAL").cloned();

        let call_timeout_ms = parse_or(vars, "SWITCHBOARD_CALL_TIMEOUT_MS", DEFAULT_CALL_TIMEOUT_MS)?;
        if call_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "SWITCHBOARD_CALL_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }

        let room_channel_capacity = parse_or(
            vars,
            "SWITCHBOARD_ROOM_CHANNEL_CAPACITY",
            DEFAULT_ROOM_CHANNEL_CAPACITY,
        )?;
        if room_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "SWITCHBOARD_ROOM_CHANNEL_CAPACITY must be greater than 0".to_string(),
            ));
        }

        let default_room = vars
            .get("SWITCHBOARD_DEFAULT_ROOM")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ROOM.to_string());

        Ok(Config {
            bind_address,
            ice_servers,
            turn_username,
            turn_credential,
            call_timeout_ms,
            room_channel_capacity,
            default_room,
        })
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn ice_server_config(&self) -> Vec<IceServerConfig> {
        if self.ice_servers.is_empty() {
            return Vec::new();
        }
        vec![IceServerConfig {
            urls: self.ice_servers.clone(),
            username: self.turn_username.clone(),
            credential: self.turn_credential.clone(),
        }]
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            ice_servers: self.ice_server_config(),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}='{raw}' is not a valid number"))),
        None => Ok(default),
    }
}
