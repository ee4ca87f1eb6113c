//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Telephony carrier account.
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Speech recognition vendor.
    #[serde(default)]
    pub asr: AsrConfig,

    /// Language model vendor.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Speech synthesis vendor.
    #[serde(default)]
    pub tts: TtsConfig,

    /// Control-plane authentication.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Observer stream settings.
    #[serde(default)]
    pub observers: ObserverConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable hostname stamped into carrier callback and
    /// media-stream URLs.
    #[serde(default)]
    pub public_host: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelephonyConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub from_number: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AsrConfig {
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub voice_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared bearer secret for state-changing requests.
    #[serde(default)]
    pub shared_secret: String,

    /// Sliding-window limit on call initiations per minute per client.
    #[serde(default = "default_initiate_limit")]
    pub initiate_limit: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObserverConfig {
    /// Allowed origins for observer WebSocket connections. Empty list
    /// allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "outcall_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    3000
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_initiate_limit() -> u32 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_host: String::new(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_llm_model(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            shared_secret: String::new(),
            initiate_limit: default_initiate_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `PORT` / `OUTCALL_PORT` overrides `server.port`
/// - `OUTCALL_HOST` overrides `server.host`
/// - `OUTCALL_PUBLIC_HOST` overrides `server.public_host`
/// - `TWILIO_ACCOUNT_SID` / `TWILIO_AUTH_TOKEN` / `TWILIO_PHONE_NUMBER`
///   override the telephony account
/// - `DEEPGRAM_API_KEY` overrides `asr.api_key`
/// - `OPENAI_API_KEY` overrides `llm.api_key`
/// - `ELEVENLABS_API_KEY` / `ELEVENLABS_VOICE_ID` override the TTS vendor
/// - `OUTCALL_SHARED_SECRET` overrides `auth.shared_secret`
/// - `OUTCALL_ALLOWED_ORIGINS` (comma-separated) overrides
///   `observers.allowed_origins`
/// - `OUTCALL_LOG_LEVEL` / `OUTCALL_LOG_JSON` override logging
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(host) = std::env::var("OUTCALL_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    for key in ["OUTCALL_PORT", "PORT"] {
        if let Ok(port) = std::env::var(key) {
            if let Ok(parsed) = port.parse() {
                config.server.port = parsed;
                break;
            }
        }
    }
    if let Ok(host) = std::env::var("OUTCALL_PUBLIC_HOST") {
        config.server.public_host = host;
    }
    if let Ok(sid) = std::env::var("TWILIO_ACCOUNT_SID") {
        config.telephony.account_sid = sid;
    }
    if let Ok(token) = std::env::var("TWILIO_AUTH_TOKEN") {
        config.telephony.auth_token = token;
    }
    if let Ok(number) = std::env::var("TWILIO_PHONE_NUMBER") {
        config.telephony.from_number = number;
    }
    if let Ok(key) = std::env::var("DEEPGRAM_API_KEY") {
        config.asr.api_key = key;
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        config.llm.api_key = key;
    }
    if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
        config.tts.api_key = key;
    }
    if let Ok(voice) = std::env::var("ELEVENLABS_VOICE_ID") {
        config.tts.voice_id = voice;
    }
    if let Ok(secret) = std::env::var("OUTCALL_SHARED_SECRET") {
        config.auth.shared_secret = secret;
    }
    if let Ok(origins) = std::env::var("OUTCALL_ALLOWED_ORIGINS") {
        config.observers.allowed_origins = origins
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
    }
    if let Ok(level) = std::env::var("OUTCALL_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("OUTCALL_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_no_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.auth.initiate_limit, 30);
        assert!(config.observers.allowed_origins.is_empty());
        assert!(!config.logging.json);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Some("/definitely/not/a/real/outcall.toml")).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn file_values_are_loaded_and_env_overrides_win() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 4100\npublic_host = \"calls.example.com\"\n\n\
             [auth]\nshared_secret = \"from-file\"\ninitiate_limit = 5"
        )
        .unwrap();

        let config = load_config(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.server.public_host, "calls.example.com");
        assert_eq!(config.auth.shared_secret, "from-file");
        assert_eq!(config.auth.initiate_limit, 5);

        // Env overrides take precedence over the file.
        std::env::set_var("OUTCALL_SHARED_SECRET", "from-env");
        let config = load_config(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.auth.shared_secret, "from-env");
        std::env::remove_var("OUTCALL_SHARED_SECRET");
    }

    #[test]
    fn broken_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml {{").unwrap();
        assert!(load_config(Some(file.path().to_str().unwrap())).is_err());
    }
}
