//! Session controller configuration.
//!
//! Configuration is loaded from environment variables with sensible
//! defaults; `from_vars` exists so tests can inject values without
//! touching the process environment.

use media_engine::{MediaKind, RouterOptions, RtpCodecCapability};
use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default maximum participants per room (0 disables the cap).
pub const DEFAULT_MAX_PEERS_PER_ROOM: usize = 100;

/// Default outbound event buffer per connection.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Default controller instance ID prefix.
pub const DEFAULT_SC_ID_PREFIX: &str = "sc";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Session controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this controller instance.
    pub sc_id: String,

    /// Maximum participants per room; 0 means unlimited.
    pub max_peers_per_room: usize,

    /// Outbound event channel capacity per connection.
    pub outbound_buffer: usize,

    /// Codecs configured on every room router.
    pub media_codecs: Vec<RtpCodecCapability>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but unparseable.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let max_peers_per_room = parse_or_default(
            vars,
            "SC_MAX_PEERS_PER_ROOM",
            DEFAULT_MAX_PEERS_PER_ROOM,
        )?;

        let outbound_buffer =
            parse_or_default(vars, "SC_OUTBOUND_BUFFER", DEFAULT_OUTBOUND_BUFFER)?;
        if outbound_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "SC_OUTBOUND_BUFFER".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        // Generate controller instance ID
        let sc_id = vars.get("SC_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_SC_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            sc_id,
            max_peers_per_room,
            outbound_buffer,
            media_codecs: default_media_codecs(),
        })
    }

    /// Router options derived from the configured codecs.
    #[must_use]
    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            media_codecs: self.media_codecs.clone(),
        }
    }
}

fn parse_or_default(
    vars: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), raw.clone())),
    }
}

/// Baseline codec set every router is created with.
#[must_use]
pub fn default_media_codecs() -> Vec<RtpCodecCapability> {
    vec![
        RtpCodecCapability {
            kind: MediaKind::Audio,
            mime_type: "audio/opus".to_string(),
            clock_rate: 48_000,
            channels: Some(2),
        },
        RtpCodecCapability {
            kind: MediaKind::Video,
            mime_type: "video/VP8".to_string(),
            clock_rate: 90_000,
            channels: None,
        },
    ]
}
