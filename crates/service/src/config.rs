use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub audit: AuditConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `postgres://…` or `sqlite:…`; the scheme selects the backend.
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Append engine and verification settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Events buffered between producers and the writer task.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How long `AuditLogger::log` waits for queue space before dropping.
    #[serde(default = "default_enqueue_timeout")]
    pub enqueue_timeout_ms: u64,

    /// Rows fetched per round trip while verifying.
    #[serde(default = "default_verify_batch_size")]
    pub verify_batch_size: u32,

    /// Minutes between scheduled integrity checks; 0 disables the job.
    #[serde(default = "default_integrity_check_interval")]
    pub integrity_check_interval_mins: u64,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl AuditConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    1
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_busy_timeout() -> u64 {
    5_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_enqueue_timeout() -> u64 {
    250
}
fn default_verify_batch_size() -> u32 {
    1000
}
fn default_integrity_check_interval() -> u64 {
    60
}
fn default_shutdown_timeout() -> u64 {
    10
}
fn default_metrics_listen_addr() -> String {
    "0.0.0.0:9090".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with AUDIT__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("AUDIT").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Defaults are embedded so tests do not depend on the working directory.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [database]
            url = ""
            max_connections = 10
            min_connections = 1
            connect_timeout_secs = 30
            idle_timeout_secs = 600
            busy_timeout_ms = 5000

            [logging]
            level = "info"
            format = "json"

            [audit]
            queue_capacity = 1024
            enqueue_timeout_ms = 250
            verify_batch_size = 1000
            integrity_check_interval_mins = 60
            shutdown_timeout_secs = 10
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        // Skip validation in tests to allow partial configs
        Ok(cfg)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "AUDIT__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.audit.queue_capacity == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "audit.queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.audit.verify_batch_size == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "audit.verify_batch_size must be greater than 0".to_string(),
            ));
        }

        if self.metrics.enabled && self.metrics.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigValidationError::InvalidValue(format!(
                "metrics.listen_addr '{}' is not a socket address",
                self.metrics.listen_addr
            )));
        }

        Ok(())
    }
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
            busy_timeout_ms: config.busy_timeout_ms,
        }
    }
}
