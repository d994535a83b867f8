use serde::Deserialize;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

pub const DEFAULT_SETTINGS_PATH: &str = "src/resources/settings.yaml";

// Main configuration struct
#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub gmail: GmailConfig,
    pub scanner: ScannerConfig,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GmailConfig {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub api_base_url: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub include_spam_trash: bool,
    pub request_timeout_seconds: u64,
}

impl Default for GmailConfig {
    fn default() -> Self {
        GmailConfig {
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            api_base_url: "https://gmail.googleapis.com/gmail/v1/".to_string(),
            auth_uri: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            include_spam_trash: true,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerConfig {
    /// Upper bound on message scans with fetches in flight at once.
    pub max_concurrent_scans: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig { max_concurrent_scans: 8 }
    }
}

// REST server configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: PathBuf::from("www"),
        }
    }
}

impl ServerConfig {
    /// The listen port, with `PORT` from the environment taking precedence.
    pub fn effective_port(&self) -> u16 {
        std::env::var("PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub prefix: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 8125,
            prefix: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: "info".to_string(), file: None }
    }
}

/// Runs before logging is configured, so failures are reported only through
/// the returned error.
pub fn load_settings(path: &Path) -> Result<Config> {
    // Open the YAML file
    let file = File::open(path).with_context(|| format!("Cannot find settings at {}", path.display()))?;
    let reader = BufReader::new(file);

    // Parse the YAML file into the Config struct
    serde_yaml::from_reader(reader).with_context(|| format!("Cannot deserialize settings at {}", path.display()))
}
