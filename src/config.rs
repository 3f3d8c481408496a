// Configuration File Support
//
// This module provides configuration file parsing for the genai-gate service.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from XDG config directory: ~/.config/genai-gate/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::rate_limit::config::{LedgerConfig, RateLimitConfig};

/// Default Gemini REST endpoint
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when a caller does not name one
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Provider budgets
    pub limits: RateLimitConfig,

    /// Usage ledger storage
    pub ledger: LedgerConfig,

    /// Generative provider
    pub provider: ProviderConfig,

    /// HTTP server
    pub server: ServerConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Generative provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// REST base URL, without trailing slash
    pub base_url: String,

    /// Model used when none is given
    pub default_model: String,

    /// Timeout in seconds for one provider call
    pub timeout_secs: u64,

    /// API key; usually supplied through `GEMINI_API_KEY`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            timeout_secs: 60,
            api_key: None,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Whether `/metrics` is served
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            metrics_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// Environment overrides are applied in both cases, so a missing file
    /// still honours `GEMINI_API_KEY` and the `GENAI_GATE_*` variables.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/genai-gate/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "genai-gate", "genai-gate") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            // Fallback if XDG dirs cannot be determined
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config").join("genai-gate").join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - GENAI_GATE_LOG_LEVEL, GENAI_GATE_LOG_FORMAT
    /// - GENAI_GATE_RPM, GENAI_GATE_RPD, GENAI_GATE_MIN_INTERVAL_MS, GENAI_GATE_FALLBACK_PERCENT
    /// - GENAI_GATE_LEDGER_BACKEND, GENAI_GATE_LEDGER_PATH, GENAI_GATE_SYNC_INTERVAL_SECS
    /// - GENAI_GATE_BASE_URL, GENAI_GATE_MODEL, GEMINI_API_KEY
    /// - GENAI_GATE_HOST, GENAI_GATE_PORT, GENAI_GATE_METRICS_ENABLED
    fn apply_env_overrides(mut self) -> Self {
        // Logging overrides
        if let Ok(level) = std::env::var("GENAI_GATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("GENAI_GATE_LOG_FORMAT") {
            self.logging.format = format;
        }

        self.limits = self.limits.apply_env_overrides();

        // Ledger overrides
        if let Ok(backend) = std::env::var("GENAI_GATE_LEDGER_BACKEND") {
            match backend.parse() {
                Ok(backend) => self.ledger.backend = backend,
                Err(e) => tracing::warn!("Ignoring GENAI_GATE_LEDGER_BACKEND: {}", e),
            }
        }
        if let Ok(path) = std::env::var("GENAI_GATE_LEDGER_PATH") {
            self.ledger.path = Some(PathBuf::from(path));
        }
        if let Ok(secs) = std::env::var("GENAI_GATE_SYNC_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                if secs > 0 {
                    self.ledger.sync_interval_secs = secs;
                }
            }
        }

        // Provider overrides
        if let Ok(url) = std::env::var("GENAI_GATE_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Ok(model) = std::env::var("GENAI_GATE_MODEL") {
            self.provider.default_model = model;
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                self.provider.api_key = Some(key);
            }
        }

        // Server overrides
        if let Ok(host) = std::env::var("GENAI_GATE_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("GENAI_GATE_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(enabled) = std::env::var("GENAI_GATE_METRICS_ENABLED") {
            self.server.metrics_enabled = enabled.parse().unwrap_or(self.server.metrics_enabled);
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        // Validate logging level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}. Must be one of: trace, debug, info, warn, error", self.logging.level),
        }

        // Validate logging format
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!("Invalid log format: {}. Must be one of: json, pretty, compact", self.logging.format),
        }

        self.limits.validate()?;
        self.ledger.validate()?;

        if self.provider.base_url.is_empty() {
            anyhow::bail!("provider.base_url must not be empty");
        }
        if self.provider.default_model.is_empty() {
            anyhow::bail!("provider.default_model must not be empty");
        }
        if self.provider.timeout_secs == 0 {
            anyhow::bail!("provider.timeout_secs must be > 0");
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging.level.to_lowercase().parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
