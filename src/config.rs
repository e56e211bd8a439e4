//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub federation: FederationConfig,
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Canonical public hostname (e.g., "social.example.com")
    pub hostname: String,
    /// Host (with port) used in generated links when `hostname` is not a
    /// dotted domain, e.g. "localhost:8080"
    pub debug_host: Option<String>,
}

impl ServerConfig {
    /// A hostname without a domain separator marks a local/debug deployment.
    pub fn is_debug_deployment(&self) -> bool {
        !self.hostname.contains('.')
    }

    /// Public base URL of this server
    ///
    /// # Returns
    /// `https://{hostname}`, or `http://{debug_host}` for debug deployments
    pub fn base_url(&self) -> String {
        if self.is_debug_deployment() {
            let host = self.debug_host.as_deref().unwrap_or(&self.hostname);
            format!("http://{}", host)
        } else {
            format!("https://{}", self.hostname)
        }
    }
}

/// Federation inbox configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Path to the untrusted host list
    pub trust_list_path: PathBuf,
    /// Accepted age of an embedded activity timestamp (default: 300)
    pub freshness_window_seconds: u64,
    /// Deadline for a single collaborator call (default: 1000)
    pub backend_timeout_ms: u64,
    /// Maximum accepted inbox body size (default: 1 MiB)
    pub max_body_bytes: usize,
}

impl FederationConfig {
    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_seconds)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

/// Backend collaborator endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Article ingestion service base URL
    pub articles_url: String,
    /// Follow service base URL
    pub follows_url: String,
    /// User directory base URL
    pub users_url: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEDINBOX__*)
    ///
    /// # Errors
    /// Returns error if configuration is missing or invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("federation.freshness_window_seconds", 300)?
            .set_default("federation.backend_timeout_ms", 1000)?
            .set_default("federation.max_body_bytes", 1024 * 1024)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("FEDINBOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        if self.server.hostname.trim().is_empty() {
            return Err(AppError::Config(
                "server.hostname must not be empty".to_string(),
            ));
        }

        if self.federation.freshness_window_seconds == 0 {
            return Err(AppError::Config(
                "federation.freshness_window_seconds must be greater than 0".to_string(),
            ));
        }

        if self.federation.backend_timeout_ms == 0 {
            return Err(AppError::Config(
                "federation.backend_timeout_ms must be greater than 0".to_string(),
            ));
        }

        for (key, value) in [
            ("backend.articles_url", &self.backend.articles_url),
            ("backend.follows_url", &self.backend.follows_url),
            ("backend.users_url", &self.backend.users_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| AppError::Config(format!("{key} is not a valid URL: {e}")))?;
        }

        if self.server.is_debug_deployment() && self.server.debug_host.is_none() {
            tracing::warn!(
                hostname = %self.server.hostname,
                "Debug deployment without server.debug_host; discovery links will use the request host"
            );
        }

        Ok(())
    }
}
