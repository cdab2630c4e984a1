//! Nexus configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the nexus service.
#[derive(Debug, Clone, Deserialize)]
pub struct NexusConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "NexusConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Host agents should reach the nexus at; advertised in the synthetic
    /// nexus peer entry.
    #[serde(default = "NexusConfig::default_public_host")]
    pub public_host: String,

    /// Port agents should reach the nexus at.
    #[serde(default = "NexusConfig::default_public_port")]
    pub public_port: u16,

    /// Directory for the RocksDB database.
    #[serde(default = "NexusConfig::default_data_dir")]
    pub data_dir: String,

    /// Directory completed uploads land in.
    #[serde(default = "NexusConfig::default_upload_dir")]
    pub upload_dir: String,

    /// Shared secret all tokens are signed with.
    pub secret: String,

    /// Operator dashboard username.
    #[serde(default = "NexusConfig::default_admin_username")]
    pub admin_username: String,

    /// Operator dashboard password.
    pub admin_password: String,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Seconds between approval-push sweeps; also the retry interval.
    #[serde(default = "NexusConfig::default_push_period")]
    pub push_period_seconds: u64,

    /// Timeout for direct requests to an agent's HTTP surface.
    #[serde(default = "NexusConfig::default_push_timeout")]
    pub push_timeout_seconds: u64,

    /// Maximum accepted upload body size in bytes.
    #[serde(default = "NexusConfig::default_max_upload")]
    pub max_upload_bytes: usize,
}

impl NexusConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_public_host() -> String {
        "127.0.0.1".to_string()
    }

    const fn default_public_port() -> u16 {
        8080
    }

    fn default_data_dir() -> String {
        "nexus-data".to_string()
    }

    fn default_upload_dir() -> String {
        "nexus-uploads".to_string()
    }

    fn default_admin_username() -> String {
        "admin".to_string()
    }

    const fn default_push_period() -> u64 {
        30
    }

    const fn default_push_timeout() -> u64 {
        5
    }

    const fn default_max_upload() -> usize {
        4 * 1024 * 1024 * 1024 // 4 GiB
    }

    /// Load configuration from environment variables with code defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `NEXUS_SECRET` or `NEXUS_ADMIN_PASSWORD` is unset
    /// or a numeric variable fails to parse.
    pub fn from_env() -> Result<Self, String> {
        let secret = std::env::var("NEXUS_SECRET").map_err(|_| "NEXUS_SECRET must be set")?;
        let admin_password =
            std::env::var("NEXUS_ADMIN_PASSWORD").map_err(|_| "NEXUS_ADMIN_PASSWORD must be set")?;

        Ok(Self {
            listen_addr: env_or("NEXUS_LISTEN_ADDR", Self::default_listen_addr()),
            public_host: env_or("NEXUS_PUBLIC_HOST", Self::default_public_host()),
            public_port: env_parse("NEXUS_PUBLIC_PORT", Self::default_public_port())?,
            data_dir: env_or("NEXUS_DATA_DIR", Self::default_data_dir()),
            upload_dir: env_or("NEXUS_UPLOAD_DIR", Self::default_upload_dir()),
            secret,
            admin_username: env_or("NEXUS_ADMIN_USER", Self::default_admin_username()),
            admin_password,
            cors_origins: std::env::var("NEXUS_CORS_ORIGINS")
                .map(|v| v.split(',').map(str::trim).map(String::from).collect())
                .unwrap_or_default(),
            push_period_seconds: env_parse("NEXUS_PUSH_PERIOD_SECONDS", Self::default_push_period())?,
            push_timeout_seconds: env_parse(
                "NEXUS_PUSH_TIMEOUT_SECONDS",
                Self::default_push_timeout(),
            )?,
            max_upload_bytes: env_parse("NEXUS_MAX_UPLOAD_BYTES", Self::default_max_upload())?,
        })
    }

    /// Get the push sweep period as a `Duration`.
    #[must_use]
    pub const fn push_period(&self) -> Duration {
        Duration::from_secs(self.push_period_seconds)
    }

    /// Get the agent-request timeout as a `Duration`.
    #[must_use]
    pub const fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_seconds)
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| format!("invalid value for {key}")),
        Err(_) => Ok(default),
    }
}
