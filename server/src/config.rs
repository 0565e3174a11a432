use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Parley direct-message server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "parley-server", version, about = "Parley direct-message server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PARLEY_PORT", default_value = "8080")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "PARLEY_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./parley.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "PARLEY_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, signing key)
    #[arg(long, env = "PARLEY_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Public base URL used to build links to uploaded files
    #[arg(long, env = "PARLEY_PUBLIC_BASE_URL", default_value = "http://localhost:8080")]
    pub public_base_url: String,

    /// Push notification gateway (loaded from [push] section in TOML)
    #[arg(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushConfig>,

    /// Call/game handshake timing (loaded from [handshake] section in TOML)
    #[arg(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake: Option<HandshakeConfig>,
}

/// Configuration for the outbound push notification gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Whether push notifications are sent at all (default: true)
    #[serde(default = "default_push_enabled")]
    pub enabled: bool,

    /// Gateway endpoint accepting batches of notifications
    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,

    /// Maximum notifications per gateway request (default: 100)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Per-request timeout in seconds (default: 10)
    #[serde(default = "default_push_timeout")]
    pub timeout_secs: u64,

    /// Optional bearer token for the gateway
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_push_endpoint(),
            chunk_size: default_chunk_size(),
            timeout_secs: default_push_timeout(),
            access_token: None,
        }
    }
}

fn default_push_enabled() -> bool {
    true
}

fn default_push_endpoint() -> String {
    "https://exp.host/--/api/v2/push/send".to_string()
}

fn default_chunk_size() -> usize {
    crate::delivery::push::DEFAULT_CHUNK_SIZE
}

fn default_push_timeout() -> u64 {
    10
}

/// Lifetimes of pending call/game invitations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Seconds before an unanswered invitation or uncollected answer expires (default: 60)
    #[serde(default = "default_invitation_ttl")]
    pub invitation_ttl_secs: u64,

    /// Interval in seconds between expiry sweeps (default: 15)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            invitation_ttl_secs: 60,
            sweep_interval_secs: 15,
        }
    }
}

fn default_invitation_ttl() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    15
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
            config: "./parley.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            push: Some(PushConfig::default()),
            handshake: Some(HandshakeConfig::default()),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PARLEY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PARLEY_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }

    pub fn push_config(&self) -> PushConfig {
        self.push.clone().unwrap_or_default()
    }

    pub fn handshake_config(&self) -> HandshakeConfig {
        self.handshake.clone().unwrap_or_default()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Parley Server Configuration
# Place this file at ./parley.toml or specify with --config <path>
# All settings can be overridden via environment variables (PARLEY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8080)
# port = 8080

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for SQLite database and JWT signing key
# data_dir = "./data"

# Base URL clients use to fetch uploaded files
# public_base_url = "http://localhost:8080"

# ---- Push Notifications ----
# [push]
# enabled = true
# endpoint = "https://exp.host/--/api/v2/push/send"
# chunk_size = 100      # Max notifications per gateway request
# timeout_secs = 10
# access_token = ""     # Optional bearer token for the gateway

# ---- Call/Game Handshakes ----
# [handshake]
# invitation_ttl_secs = 60   # Unanswered invitations expire after this
# sweep_interval_secs = 15   # How often expired invitations are purged
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_sections_fill_in_defaults() {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                r#"
                port = 9000
                [push]
                chunk_size = 50
                [handshake]
                invitation_ttl_secs = 5
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(config.port, 9000);
        let push = config.push_config();
        assert_eq!(push.chunk_size, 50);
        assert!(push.enabled);
        assert_eq!(push.endpoint, "https://exp.host/--/api/v2/push/send");
        let handshake = config.handshake_config();
        assert_eq!(handshake.invitation_ttl_secs, 5);
        assert_eq!(handshake.sweep_interval_secs, 15);
    }

    #[test]
    fn template_parses_as_toml() {
        let parsed: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(&generate_config_template()))
            .extract()
            .unwrap();
        assert_eq!(parsed.port, 8080);
    }
}
