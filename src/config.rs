use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Capture-style gateway credentials (REST/OAuth client-credential flow).
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CaptureGatewayConfig {
    /// Base URL of the gateway REST API
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Default for CaptureGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.gateway.example".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
        }
    }
}

/// Redirect-style gateway credentials (HMAC-signed return flow).
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct RedirectGatewayConfig {
    /// Endpoint the customer is redirected to
    pub endpoint: String,
    pub merchant_id: String,
    /// Keyed-hash secret shared with the gateway. Never logged.
    pub secret_key: String,
}

impl Default for RedirectGatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://pay.gateway.example/checkout".to_string(),
            merchant_id: String::new(),
            secret_key: String::new(),
        }
    }
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port (1024-65535)
    #[serde(default = "default_port")]
    #[validate(range(min = 1024, max = 65535))]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Outbound gateway call timeout in seconds. A timed-out call is a
    /// failed outcome, never left pending.
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,

    #[serde(default)]
    pub capture_gateway: CaptureGatewayConfig,

    #[serde(default)]
    pub redirect_gateway: RedirectGatewayConfig,
}

impl AppConfig {
    /// Constructor used by tests and tools that bypass file/env loading.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            gateway_timeout_secs: default_gateway_timeout_secs(),
            capture_gateway: CaptureGatewayConfig::default(),
            redirect_gateway: RedirectGatewayConfig::default(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Secrets must be present outside development; defaults are
    /// placeholders only.
    pub fn validate_secrets(&self) -> Result<(), ValidationError> {
        if self.is_development() {
            return Ok(());
        }
        if self.capture_gateway.client_secret.is_empty() {
            return Err(ValidationError::new("capture_gateway_client_secret_missing"));
        }
        if self.redirect_gateway.secret_key.is_empty() {
            return Err(ValidationError::new("redirect_gateway_secret_key_missing"));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Configuration validation failed: {0}")]
    Secrets(#[from] ValidationError),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_gateway_timeout_secs() -> u64 {
    30
}

/// Initializes the tracing subscriber. RUST_LOG overrides the configured
/// level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads configuration by layering `config/default`, the environment
/// profile file, and `APP__`-prefixed environment variables.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_secrets().map_err(|e| {
        error!("Gateway credential validation failed: {:?}", e);
        AppConfigError::Secrets(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_allows_placeholder_secrets() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        assert!(cfg.validate_secrets().is_ok());
    }

    #[test]
    fn production_requires_gateway_secrets() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        );
        assert!(cfg.validate_secrets().is_err());
    }
}
