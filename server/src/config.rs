use clap::{ArgAction, Parser};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_PATH: &str = "./chat.toml";

/// Command-line flags. Every layered field is optional so an absent flag
/// leaves the TOML and environment values in place.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "chat-server", version, about = "Real-time chat server")]
pub struct Cli {
    /// Port to listen on [default: 5000]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file [default: ./chat.toml]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, signing key) [default: ./data]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Accept the handshake token from the `?token=` query parameter [default: true]
    #[arg(long, action = ArgAction::Set)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_query_token: Option<bool>,

    /// Lifetime of tokens issued with --issue-token, in seconds [default: 3600]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_ttl_secs: Option<i64>,

    /// Print an access token for this user id and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_token: Option<i64>,
}

/// Effective server configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub config: String,
    pub json_logs: bool,
    pub generate_config: bool,
    pub data_dir: String,
    pub allow_query_token: bool,
    pub token_ttl_secs: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_token: Option<i64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            bind_address: "0.0.0.0".to_string(),
            config: DEFAULT_CONFIG_PATH.to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            allow_query_token: true,
            token_ttl_secs: 3600,
            issue_token: None,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (CHAT_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        Self::layered(Cli::parse()).extract()
    }

    fn layered(cli: Cli) -> Figment {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("CHAT_"))
            .merge(Serialized::defaults(cli))
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Chat Server Configuration
# Place this file at ./chat.toml or specify with --config <path>
# All settings can be overridden via environment variables (CHAT_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 5000)
# port = 5000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for SQLite database and JWT signing key
# data_dir = "./data"

# Accept the WebSocket handshake token from ?token= when the client
# cannot set an Authorization header (browsers)
# allow_query_token = true

# Lifetime of tokens printed by --issue-token
# token_ttl_secs = 3600
"#
    .to_string()
}
