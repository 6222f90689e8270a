//! Configuration management
//!
//! This module handles loading and parsing configuration for the Dermolo backend.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session cookie and lifetime configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Certificate ingestion and numbering configuration
    #[serde(default)]
    pub certificates: CertificateConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path or URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/dermolo.db".to_string()
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in days (also the cookie Max-Age)
    #[serde(default = "default_lifetime_days")]
    pub lifetime_days: i64,
    /// Mark the session cookie `Secure` (enable in production behind TLS)
    #[serde(default)]
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_days: default_lifetime_days(),
            secure_cookie: false,
        }
    }
}

fn default_lifetime_days() -> i64 {
    7
}

impl SessionConfig {
    /// Session lifetime as a duration
    pub fn lifetime(&self) -> Duration {
        Duration::days(self.lifetime_days)
    }
}

/// Certificate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateConfig {
    /// Shared secret expected in `Authorization: Bearer` on the ingestion endpoint.
    /// When unset, every ingestion request is refused.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Prefix used when a (type, year) sequence is created on first use
    #[serde(default = "default_prefix_code")]
    pub prefix_code: String,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            prefix_code: default_prefix_code(),
        }
    }
}

fn default_prefix_code() -> String {
    "001".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - DERMOLO_SERVER_HOST
    /// - DERMOLO_SERVER_PORT
    /// - DERMOLO_DATABASE_URL
    /// - DERMOLO_SESSION_LIFETIME_DAYS
    /// - DERMOLO_SESSION_SECURE_COOKIE
    /// - DERMOLO_API_TOKEN
    /// - DERMOLO_CERTIFICATES_PREFIX_CODE
    ///
    /// The merged configuration is validated before it is returned.
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the services cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.lifetime_days <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "session.lifetime_days must be positive, got {}",
                self.session.lifetime_days
            )));
        }
        if self.certificates.prefix_code.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "certificates.prefix_code cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("DERMOLO_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("DERMOLO_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(url) = std::env::var("DERMOLO_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(days) = std::env::var("DERMOLO_SESSION_LIFETIME_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                self.session.lifetime_days = days;
            }
        }
        if let Ok(secure) = std::env::var("DERMOLO_SESSION_SECURE_COOKIE") {
            match secure.to_lowercase().as_str() {
                "true" | "1" => self.session.secure_cookie = true,
                "false" | "0" => self.session.secure_cookie = false,
                _ => {} // Ignore invalid values
            }
        }

        if let Ok(token) = std::env::var("DERMOLO_API_TOKEN") {
            if !token.is_empty() {
                self.certificates.api_token = Some(token);
            }
        }
        if let Ok(prefix) = std::env::var("DERMOLO_CERTIFICATES_PREFIX_CODE") {
            self.certificates.prefix_code = prefix;
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "DERMOLO_SERVER_HOST",
    "DERMOLO_SERVER_PORT",
    "DERMOLO_DATABASE_URL",
    "DERMOLO_SESSION_LIFETIME_DAYS",
    "DERMOLO_SESSION_SECURE_COOKIE",
    "DERMOLO_API_TOKEN",
    "DERMOLO_CERTIFICATES_PREFIX_CODE",
];
