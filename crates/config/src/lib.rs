//! Configuration loading and validation for HiveCore.
//!
//! Loads configuration from `~/.hivecore/config.toml` with environment
//! variable overrides. Validates all settings at load time.

use hivecore_telemetry::{ModelPricing, PricingTable, WebhookConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.hivecore/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    /// HTTP gateway serving metrics exports
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Push delivery to an external collector
    #[serde(default)]
    pub webhook: WebhookSettings,

    /// Custom per-1K-token pricing (model name -> pricing)
    #[serde(default)]
    pub pricing: BTreeMap<String, PricingOverride>,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    9464
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Sent as the `X-API-Key` header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Deliver from a background worker pool instead of the caller's thread
    #[serde(default = "default_true")]
    pub background: bool,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Extra headers sent with every push
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_api_url() -> String {
    "http://localhost:8000/api".into()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_true() -> bool {
    true
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_api_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            background: true,
            queue_capacity: default_queue_capacity(),
            headers: BTreeMap::new(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("enabled", &self.enabled)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .field("background", &self.background)
            .field("queue_capacity", &self.queue_capacity)
            .field("headers", &self.headers)
            .finish()
    }
}

impl WebhookSettings {
    /// Exporter settings for these values.
    pub fn to_exporter_config(&self) -> WebhookConfig {
        WebhookConfig {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            background: self.background,
            queue_capacity: self.queue_capacity,
            headers: self.headers.clone(),
        }
    }
}

/// Custom per-1K-token pricing for a model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricingOverride {
    /// Price per 1K input tokens in USD
    pub input_per_1k: f64,
    /// Price per 1K output tokens in USD
    pub output_per_1k: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl HubConfig {
    /// Load configuration from the default path (~/.hivecore/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `HIVECORE_WEBHOOK_URL` (also enables the webhook)
    /// - `HIVECORE_API_KEY`
    /// - `HIVECORE_GATEWAY_PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`Self::load`]).
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = var("HIVECORE_WEBHOOK_URL") {
            self.webhook.api_url = url;
            self.webhook.enabled = true;
        }

        if let Some(key) = var("HIVECORE_API_KEY") {
            self.webhook.api_key = Some(key);
        }

        if let Some(port) = var("HIVECORE_GATEWAY_PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("HIVECORE_GATEWAY_PORT is not a port: {port}"))
            })?;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".hivecore")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.webhook.enabled {
            let url = &self.webhook.api_url;
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::ValidationError(format!(
                    "webhook.api_url must be an http(s) URL, got {url:?}"
                )));
            }
            if self.webhook.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(
                    "webhook.timeout_secs must be > 0".into(),
                ));
            }
            if self.webhook.queue_capacity == 0 {
                return Err(ConfigError::ValidationError(
                    "webhook.queue_capacity must be > 0".into(),
                ));
            }
        }

        for (model, price) in &self.pricing {
            if !(price.input_per_1k >= 0.0 && price.output_per_1k >= 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "pricing for {model} must be non-negative"
                )));
            }
        }

        Ok(())
    }

    /// Built-in pricing plus the configured overrides.
    pub fn pricing_table(&self) -> PricingTable {
        let table = PricingTable::with_defaults();
        for (model, price) in &self.pricing {
            table.set(model, ModelPricing::new(price.input_per_1k, price.output_per_1k));
        }
        table
    }

    /// Generate a default config TOML string (for `init-config`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
