// Configuration File Support
//
// This module provides configuration file parsing for the Listra gateway.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from XDG config directory: ~/.config/listra/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default gated-endpoint limiter settings
pub const DEFAULT_WINDOW_MS: u64 = 60_000; // one minute window
pub const DEFAULT_MAX_REQUESTS: u32 = 30; // requests per window
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default tier ceilings and trial length
pub const DEFAULT_PRO_USAGE_LIMIT: u64 = 1000;
pub const DEFAULT_STANDARD_USAGE_LIMIT: u64 = 10;
pub const DEFAULT_TRIAL_PERIOD_DAYS: i64 = 14;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// API server configuration
    pub server: ServerConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Rate limiter configuration
    pub rate_limit: RateLimitConfig,

    /// Entitlement configuration
    pub entitlement: EntitlementConfig,

    /// Identity configuration (API key → account id)
    pub identity: IdentityConfig,

    /// Generation backend configuration
    pub generator: GeneratorConfig,

    /// Admin API configuration
    pub admin: AdminConfig,
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

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// API port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to serve the metrics endpoint
    pub enabled: bool,

    /// Port for the metrics server
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Cleanup sweep interval in seconds
    pub sweep_interval_secs: u64,

    /// Named limiters; no two limiters share state
    pub limiters: Vec<LimiterSettings>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            limiters: vec![LimiterSettings::default()],
        }
    }
}

impl RateLimitConfig {
    /// Sweep interval as a duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Settings for one named fixed-window limiter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimiterSettings {
    /// Limiter name, referenced by gates
    pub name: String,

    /// Human-readable label used in denial messages
    pub label: String,

    /// Window duration in milliseconds
    pub window_ms: u64,

    /// Maximum requests per identifier per window
    pub max_requests: u32,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            name: "generation".to_string(),
            label: "listing generation".to_string(),
            window_ms: DEFAULT_WINDOW_MS,
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

/// When durable usage counters are reset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UsageResetPeriod {
    /// Counters accumulate for the account's lifetime (observed source
    /// behavior)
    #[default]
    None,
    /// Counters reset at each UTC month boundary
    Monthly,
}

/// Entitlement configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EntitlementConfig {
    /// Usage ceiling for the pro tier
    pub pro_usage_limit: u64,

    /// Usage ceiling for every other effective tier
    pub standard_usage_limit: u64,

    /// Trial length granted to new accounts, in days
    pub trial_period_days: i64,

    /// Usage counter reset cycle
    pub usage_reset_period: UsageResetPeriod,
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            pro_usage_limit: DEFAULT_PRO_USAGE_LIMIT,
            standard_usage_limit: DEFAULT_STANDARD_USAGE_LIMIT,
            trial_period_days: DEFAULT_TRIAL_PERIOD_DAYS,
            usage_reset_period: UsageResetPeriod::None,
        }
    }
}

impl EntitlementConfig {
    /// Tier ceilings for the resolver
    pub fn ceilings(&self) -> crate::gateway::entitlement::TierCeilings {
        crate::gateway::entitlement::TierCeilings {
            pro: self.pro_usage_limit,
            standard: self.standard_usage_limit,
        }
    }

    /// Trial period as a chrono duration
    pub fn trial_period(&self) -> chrono::Duration {
        chrono::Duration::days(self.trial_period_days)
    }
}

/// Identity configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct IdentityConfig {
    /// Static API key → account id map for local runs
    pub api_keys: HashMap<String, String>,
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Upstream generation URL; the local stub is used when unset
    pub upstream_url: Option<String>,

    /// Upstream request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            upstream_url: None,
            timeout_secs: 30,
        }
    }
}

impl GeneratorConfig {
    /// Upstream timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Admin API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// Token required by admin routes; admin routes are disabled when unset
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
            metrics: MetricsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            entitlement: EntitlementConfig::default(),
            identity: IdentityConfig::default(),
            generator: GeneratorConfig::default(),
            admin: AdminConfig::default(),
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
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default().apply_env_overrides());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file from {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file from {:?}", path))?;

        // Apply environment variable overrides
        let config = config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/listra/config.toml` on Linux/Mac
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "listra", "Listra") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            // Fallback if XDG dirs cannot be determined
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("listra")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - LISTRA_LOG_LEVEL
    /// - LISTRA_LOG_FORMAT
    /// - LISTRA_PORT
    /// - LISTRA_METRICS_ENABLED
    /// - LISTRA_METRICS_PORT
    /// - LISTRA_TRIAL_PERIOD_DAYS
    /// - LISTRA_ADMIN_TOKEN
    /// - LISTRA_UPSTREAM_URL
    fn apply_env_overrides(mut self) -> Self {
        // Logging overrides
        if let Ok(level) = std::env::var("LISTRA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LISTRA_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Server overrides
        if let Ok(port) = std::env::var("LISTRA_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                if port > 0 {
                    self.server.port = port;
                }
            }
        }

        // Metrics overrides
        if let Ok(enabled) = std::env::var("LISTRA_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }
        if let Ok(port) = std::env::var("LISTRA_METRICS_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                if port > 0 {
                    self.metrics.port = port;
                }
            }
        }

        // Entitlement overrides
        if let Ok(days) = std::env::var("LISTRA_TRIAL_PERIOD_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                if days > 0 {
                    self.entitlement.trial_period_days = days;
                }
            }
        }

        // Admin and upstream overrides
        if let Ok(token) = std::env::var("LISTRA_ADMIN_TOKEN") {
            if !token.is_empty() {
                self.admin.token = Some(token);
            }
        }
        if let Ok(url) = std::env::var("LISTRA_UPSTREAM_URL") {
            if !url.is_empty() {
                self.generator.upstream_url = Some(url);
            }
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
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        // Validate logging format
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        // Validate server configuration
        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }
        if self.metrics.enabled && self.metrics.port == 0 {
            anyhow::bail!("Metrics port must be > 0");
        }
        if self.metrics.enabled && self.metrics.port == self.server.port {
            anyhow::bail!("Metrics port must differ from the server port");
        }

        // Validate limiter configuration
        if self.rate_limit.limiters.is_empty() {
            anyhow::bail!("At least one limiter must be configured");
        }
        if self.rate_limit.sweep_interval_secs == 0 {
            anyhow::bail!("Sweep interval must be at least 1 second");
        }
        let mut names = std::collections::HashSet::new();
        for limiter in &self.rate_limit.limiters {
            if limiter.name.is_empty() {
                anyhow::bail!("Limiter name must not be empty");
            }
            if !names.insert(limiter.name.as_str()) {
                anyhow::bail!("Duplicate limiter name '{}'", limiter.name);
            }
            if limiter.window_ms == 0 {
                anyhow::bail!("Limiter '{}' window must be > 0ms", limiter.name);
            }
            if limiter.max_requests == 0 {
                anyhow::bail!("Limiter '{}' must allow at least 1 request", limiter.name);
            }
        }

        // Validate entitlement configuration
        if self.entitlement.trial_period_days <= 0 {
            anyhow::bail!("Trial period must be at least 1 day");
        }
        if self.entitlement.standard_usage_limit == 0 {
            anyhow::bail!("Standard usage limit must be > 0");
        }
        if self.entitlement.pro_usage_limit == 0 {
            anyhow::bail!("Pro usage limit must be > 0");
        }

        // Validate generator configuration
        if self.generator.timeout_secs == 0 {
            anyhow::bail!("Generator timeout must be at least 1 second");
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Environment variables are process-global; tests that set or read
    // LISTRA_* overrides take this lock so they cannot interleave.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.metrics.enabled, false);
        assert_eq!(config.rate_limit.limiters.len(), 1);
        assert_eq!(config.rate_limit.limiters[0].name, "generation");
        assert_eq!(config.entitlement.pro_usage_limit, 1000);
        assert_eq!(config.entitlement.standard_usage_limit, 10);
        assert_eq!(config.entitlement.trial_period_days, 14);
        assert_eq!(config.entitlement.usage_reset_period, UsageResetPeriod::None);
    }

    #[test]
    fn test_config_validation_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_no_limiters() {
        let mut config = Config::default();
        config.rate_limit.limiters.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_duplicate_limiter_names() {
        let mut config = Config::default();
        config.rate_limit.limiters.push(LimiterSettings::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_window() {
        let mut config = Config::default();
        config.rate_limit.limiters[0].window_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_max_requests() {
        let mut config = Config::default();
        config.rate_limit.limiters[0].max_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_trial_period() {
        let mut config = Config::default();
        config.entitlement.trial_period_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_metrics_port_clash() {
        let mut config = Config::default();
        config.metrics.enabled = true;
        config.metrics.port = config.server.port;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().with_extension(".nonexistent");
        let config = Config::load_from_path(&path);
        assert!(config.is_ok());
    }

    #[test]
    fn test_load_valid_toml_config() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[logging]
level = "debug"
format = "json"

[server]
port = 9000

[[rate_limit.limiters]]
name = "generation"
label = "listing generation"
window_ms = 30000
max_requests = 10

[[rate_limit.limiters]]
name = "preview"
label = "listing preview"
window_ms = 10000
max_requests = 60

[entitlement]
pro_usage_limit = 2000
standard_usage_limit = 20
trial_period_days = 7
usage_reset_period = "monthly"

[identity.api_keys]
"sk-local-1" = "acct-local"
"#;

        fs::write(temp_file.path(), toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.rate_limit.limiters.len(), 2);
        assert_eq!(config.rate_limit.limiters[1].name, "preview");
        assert_eq!(config.entitlement.pro_usage_limit, 2000);
        assert_eq!(config.entitlement.trial_period_days, 7);
        assert_eq!(
            config.entitlement.usage_reset_period,
            UsageResetPeriod::Monthly
        );
        assert_eq!(
            config.identity.api_keys.get("sk-local-1").map(String::as_str),
            Some("acct-local")
        );
    }

    #[test]
    fn test_load_invalid_toml_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[logging
level = "debug"
"#; // Invalid TOML

        fs::write(temp_file.path(), toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path());
        assert!(config.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        // Clean up environment variables first to ensure isolation
        std::env::remove_var("LISTRA_LOG_LEVEL");
        std::env::remove_var("LISTRA_PORT");
        std::env::remove_var("LISTRA_TRIAL_PERIOD_DAYS");
        std::env::remove_var("LISTRA_ADMIN_TOKEN");

        std::env::set_var("LISTRA_LOG_LEVEL", "debug");
        std::env::set_var("LISTRA_PORT", "9100");
        std::env::set_var("LISTRA_TRIAL_PERIOD_DAYS", "30");
        std::env::set_var("LISTRA_ADMIN_TOKEN", "admin-secret");

        let config = Config::default().apply_env_overrides();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.entitlement.trial_period_days, 30);
        assert_eq!(config.admin.token.as_deref(), Some("admin-secret"));

        // Clean up
        std::env::remove_var("LISTRA_LOG_LEVEL");
        std::env::remove_var("LISTRA_PORT");
        std::env::remove_var("LISTRA_TRIAL_PERIOD_DAYS");
        std::env::remove_var("LISTRA_ADMIN_TOKEN");
    }

    #[test]
    fn test_env_overrides_invalid_values() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        std::env::remove_var("LISTRA_PORT");
        std::env::remove_var("LISTRA_TRIAL_PERIOD_DAYS");

        std::env::set_var("LISTRA_PORT", "0"); // Invalid (must be > 0)
        std::env::set_var("LISTRA_TRIAL_PERIOD_DAYS", "-5"); // Invalid

        let config = Config::default().apply_env_overrides();

        // Should keep defaults for invalid values
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.entitlement.trial_period_days, 14);

        std::env::remove_var("LISTRA_PORT");
        std::env::remove_var("LISTRA_TRIAL_PERIOD_DAYS");
    }

    #[test]
    fn test_config_partial_toml() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[logging]
level = "debug"
"#;

        fs::write(temp_file.path(), toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        // Other fields should have defaults
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.rate_limit.limiters.len(), 1);
    }

    #[test]
    fn test_config_path() {
        let path = Config::config_path();
        assert!(path.ends_with("config.toml"));
    }

    #[test]
    fn test_log_level_parsing() {
        let mut config = Config::default();
        config.logging.level = "debug".to_string();
        assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);

        config.logging.level = "warn".to_string();
        assert_eq!(config.log_level().unwrap(), tracing::Level::WARN);
    }

    #[test]
    fn test_ceilings_and_trial_period_accessors() {
        let config = Config::default();
        let ceilings = config.entitlement.ceilings();
        assert_eq!(ceilings.pro, 1000);
        assert_eq!(ceilings.standard, 10);
        assert_eq!(config.entitlement.trial_period(), chrono::Duration::days(14));
        assert_eq!(config.rate_limit.sweep_interval(), Duration::from_secs(60));
    }
}
