//! Agent configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration for the agent daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the nexus (e.g., "http://10.0.0.1:8080").
    pub nexus_url: String,

    /// Host this agent is reachable at; part of its registered address.
    pub host: String,

    /// Port the agent's HTTP surface listens on; part of its registered
    /// address.
    pub port: u16,

    /// Preferred display name; defaults to `host:port` when empty.
    #[serde(default)]
    pub name: String,

    /// Directory for the identity record, peer cache and transfer log.
    #[serde(default = "AgentConfig::default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory completed incoming files land in.
    #[serde(default = "AgentConfig::default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Seconds between registration/heartbeat checks.
    #[serde(default = "AgentConfig::default_registration_period")]
    pub registration_period_seconds: u64,

    /// Seconds between status reports.
    #[serde(default = "AgentConfig::default_status_period")]
    pub status_period_seconds: u64,

    /// Seconds between transfer-log syncs.
    #[serde(default = "AgentConfig::default_log_sync_period")]
    pub log_sync_period_seconds: u64,

    /// Fixed delay before a reconnect attempt after the channel drops.
    #[serde(default = "AgentConfig::default_reconnect_delay")]
    pub reconnect_delay_seconds: u64,

    /// Timeout for every request against the nexus.
    #[serde(default = "AgentConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl AgentConfig {
    fn default_data_dir() -> PathBuf {
        PathBuf::from("agent-data")
    }

    fn default_upload_dir() -> PathBuf {
        PathBuf::from("agent-uploads")
    }

    const fn default_registration_period() -> u64 {
        30
    }

    const fn default_status_period() -> u64 {
        30
    }

    const fn default_log_sync_period() -> u64 {
        60
    }

    const fn default_reconnect_delay() -> u64 {
        10
    }

    const fn default_request_timeout() -> u64 {
        5
    }

    /// Load configuration from environment variables with code defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `AGENT_NEXUS_URL`, `AGENT_HOST` or `AGENT_PORT`
    /// is unset or a numeric variable fails to parse.
    pub fn from_env() -> Result<Self, String> {
        let nexus_url = std::env::var("AGENT_NEXUS_URL").map_err(|_| "AGENT_NEXUS_URL must be set")?;
        let host = std::env::var("AGENT_HOST").map_err(|_| "AGENT_HOST must be set")?;
        let port = std::env::var("AGENT_PORT")
            .map_err(|_| "AGENT_PORT must be set")?
            .parse()
            .map_err(|_| "invalid value for AGENT_PORT")?;

        Ok(Self {
            nexus_url: nexus_url.trim_end_matches('/').to_string(),
            host,
            port,
            name: std::env::var("AGENT_NAME").unwrap_or_default(),
            data_dir: std::env::var("AGENT_DATA_DIR")
                .map_or_else(|_| Self::default_data_dir(), PathBuf::from),
            upload_dir: std::env::var("AGENT_UPLOAD_DIR")
                .map_or_else(|_| Self::default_upload_dir(), PathBuf::from),
            registration_period_seconds: env_parse(
                "AGENT_REGISTRATION_PERIOD_SECONDS",
                Self::default_registration_period(),
            )?,
            status_period_seconds: env_parse(
                "AGENT_STATUS_PERIOD_SECONDS",
                Self::default_status_period(),
            )?,
            log_sync_period_seconds: env_parse(
                "AGENT_LOG_SYNC_PERIOD_SECONDS",
                Self::default_log_sync_period(),
            )?,
            reconnect_delay_seconds: env_parse(
                "AGENT_RECONNECT_DELAY_SECONDS",
                Self::default_reconnect_delay(),
            )?,
            request_timeout_seconds: env_parse(
                "AGENT_REQUEST_TIMEOUT_SECONDS",
                Self::default_request_timeout(),
            )?,
        })
    }

    /// Display name, falling back to the address.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            format!("{}:{}", self.host, self.port)
        } else {
            self.name.trim().to_string()
        }
    }

    /// Fixed reconnect delay as a `Duration`.
    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_seconds)
    }

    /// Per-request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| format!("invalid value for {key}")),
        Err(_) => Ok(default),
    }
}
