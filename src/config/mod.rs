use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Name of the session cookie
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    /// Name of the remember-me cookie
    #[serde(default = "default_remember_cookie")]
    pub remember_cookie: String,
    /// Query parameter accepted as an API token when no Authorization header is present
    #[serde(default = "default_token_param")]
    pub token_param: String,
    /// Absolute session lifetime in hours
    #[serde(default = "default_session_lifetime_hours")]
    pub session_lifetime_hours: i64,
    /// Seconds between periodic session-ID rotations for logged-in sessions
    #[serde(default = "default_regeneration_interval")]
    pub regeneration_interval_secs: i64,
    /// Remember-me token lifetime in days
    #[serde(default = "default_remember_lifetime_days")]
    pub remember_lifetime_days: i64,
    /// Email for the seeded admin account
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    /// Password for the seeded admin account (change it after first login)
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_cookie: default_session_cookie(),
            remember_cookie: default_remember_cookie(),
            token_param: default_token_param(),
            session_lifetime_hours: default_session_lifetime_hours(),
            regeneration_interval_secs: default_regeneration_interval(),
            remember_lifetime_days: default_remember_lifetime_days(),
            admin_email: default_admin_email(),
            admin_password: default_admin_password(),
        }
    }
}

fn default_session_cookie() -> String {
    "gatehouse_session".to_string()
}

fn default_remember_cookie() -> String {
    "remember_token".to_string()
}

fn default_token_param() -> String {
    "token".to_string()
}

fn default_session_lifetime_hours() -> i64 {
    24
}

fn default_regeneration_interval() -> i64 {
    1800
}

fn default_remember_lifetime_days() -> i64 {
    30
}

fn default_admin_email() -> String {
    "admin@localhost".to_string()
}

fn default_admin_password() -> String {
    // Generate a random password if not provided
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
