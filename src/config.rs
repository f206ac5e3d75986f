//! # Configuration Management
//!
//! Centralized configuration for the station.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - TOML strings via `from_toml()`
//! - `STATION_*` environment overrides via `from_env()` / `apply_env()`
//! - Direct instantiation with defaults
//!
//! ## Sections
//! - `ingest`: registration channel endpoint
//! - `dispatcher`: transparent-proxy listener and covert dial limits
//! - `registrations`: table TTL, capacity and sweep interval
//! - `detector`: passive capture path, off by default
//! - `liveness`: optional probe of phantoms before admission, off by default
//! - `logging`: subscriber output and metrics reporting

use crate::error::{Result, StationError};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default registration channel endpoint
pub const DEFAULT_INGEST_ENDPOINT: &str = "tcp://0.0.0.0:5591";

/// Default transparent-proxy listen address
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:41245";

/// Capture snapshot length, enough for headers plus a typical MTU
pub const DEFAULT_SNAPLEN: i32 = 1600;

/// Top-level station configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StationConfig {
    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub registrations: RegistrationConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub liveness: LivenessConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StationConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            StationError::ConfigError(format!(
                "Failed to read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| StationError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults with `STATION_*` environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `STATION_*` environment variables onto this configuration.
    ///
    /// A variable that is set but does not parse is an error rather than
    /// being silently ignored.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup("STATION_INGEST_ENDPOINT") {
            self.ingest.endpoint = endpoint;
        }
        if let Some(addr) = lookup("STATION_LISTEN_ADDRESS") {
            self.dispatcher.listen_address = addr;
        }
        if let Some(ttl) = lookup("STATION_REGISTRATION_TTL_MS") {
            self.registrations.ttl = Duration::from_millis(parse_var("STATION_REGISTRATION_TTL_MS", &ttl)?);
        }
        if let Some(max) = lookup("STATION_MAX_REGISTRATIONS") {
            self.registrations.max_registrations = parse_var("STATION_MAX_REGISTRATIONS", &max)?;
        }
        if let Some(enabled) = lookup("STATION_DETECTOR_ENABLED") {
            self.detector.enabled = parse_var("STATION_DETECTOR_ENABLED", &enabled)?;
        }
        if let Some(device) = lookup("STATION_DETECTOR_DEVICE") {
            self.detector.device = device;
        }
        if let Some(list) = lookup("STATION_DETECTOR_EXCLUDE") {
            self.detector.excluded_sources = split_list(&list);
        }
        if let Some(enabled) = lookup("STATION_LIVENESS_ENABLED") {
            self.liveness.enabled = parse_var("STATION_LIVENESS_ENABLED", &enabled)?;
        }
        if let Some(level) = lookup("STATION_LOG_LEVEL") {
            self.logging.log_level = level
                .parse::<Level>()
                .map_err(|_| StationError::ConfigError(format!("Invalid STATION_LOG_LEVEL: {level}")))?;
        }
        if let Some(json) = lookup("STATION_LOG_JSON") {
            self.logging.json_format = parse_var("STATION_LOG_JSON", &json)?;
        }
        Ok(())
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StationError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| StationError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.ingest.validate());
        errors.extend(self.dispatcher.validate());
        errors.extend(self.registrations.validate());
        errors.extend(self.detector.validate());
        errors.extend(self.liveness.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StationError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| StationError::ConfigError(format!("Invalid value for {key}: '{value}'")))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Registration channel settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// ZeroMQ endpoint the SUB socket binds to
    pub endpoint: String,

    /// Messages buffered between the socket reader and the ingest loop
    pub channel_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_INGEST_ENDPOINT.to_string(),
            channel_capacity: 1024,
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.endpoint.is_empty() {
            errors.push("Ingest endpoint cannot be empty".to_string());
        } else if !["tcp://", "ipc://"]
            .iter()
            .any(|scheme| self.endpoint.starts_with(scheme))
        {
            errors.push(format!(
                "Unsupported ingest endpoint '{}' (expected tcp:// or ipc://)",
                self.endpoint
            ));
        }

        if self.channel_capacity == 0 {
            errors.push("Ingest channel capacity must be greater than 0".to_string());
        }

        errors
    }
}

/// Transparent-proxy listener settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatcherConfig {
    /// Local address the redirected traffic lands on
    pub listen_address: String,

    /// Deadline for dialing the covert target
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Deadline for reading a transport preamble from the client
    #[serde(with = "duration_serde")]
    pub preamble_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            connect_timeout: timeout::DEFAULT_TIMEOUT,
            preamble_timeout: timeout::DEFAULT_TIMEOUT,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.listen_address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid listen address format: '{}' (expected format: '0.0.0.0:41245')",
                self.listen_address
            ));
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connect timeout too long (maximum: 300s)".to_string());
        }

        if self.preamble_timeout.as_millis() < 100 {
            errors.push("Preamble timeout too short (minimum: 100ms)".to_string());
        }

        errors
    }
}

/// Registration table settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistrationConfig {
    /// Age after which a registration no longer owns its phantom
    #[serde(with = "duration_serde")]
    pub ttl: Duration,

    /// Soft cap on table entries
    pub max_registrations: usize,

    /// Interval between expiry sweeps
    #[serde(with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(6 * 60),
            max_registrations: 100_000,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl RegistrationConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.ttl.as_secs() < 1 {
            errors.push("Registration TTL too short (minimum: 1s)".to_string());
        } else if self.ttl.as_secs() > 24 * 3600 {
            errors.push("Registration TTL too long (maximum: 24h)".to_string());
        }

        if self.max_registrations == 0 {
            errors.push("Max registrations must be greater than 0".to_string());
        }

        if self.sweep_interval.as_millis() < 100 {
            errors.push("Sweep interval too short (minimum: 100ms)".to_string());
        } else if self.sweep_interval > self.ttl {
            errors.push("Sweep interval should not exceed the registration TTL".to_string());
        }

        errors
    }
}

/// Passive capture settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectorConfig {
    pub enabled: bool,

    /// Capture interface name
    pub device: String,

    /// Source addresses never treated as candidate covert traffic
    pub excluded_sources: Vec<String>,

    /// Byte strings logged when seen in a captured payload
    pub tags: Vec<String>,

    /// Bytes captured per frame
    pub snaplen: i32,

    /// Capture read timeout, bounds how long cancellation takes to be seen
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,

    /// Interval between stats reports
    #[serde(with = "duration_serde")]
    pub stats_interval: Duration,

    /// Matched frames buffered for the forwarding stage
    pub forward_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device: String::from("eth0"),
            excluded_sources: Vec::new(),
            tags: Vec::new(),
            snaplen: DEFAULT_SNAPLEN,
            read_timeout: Duration::from_millis(250),
            stats_interval: Duration::from_secs(3),
            forward_capacity: 4096,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.enabled {
            return errors;
        }

        if self.device.is_empty() {
            errors.push("Detector device cannot be empty".to_string());
        }

        for source in &self.excluded_sources {
            if source.parse::<std::net::IpAddr>().is_err() {
                errors.push(format!("Invalid excluded source address: '{source}'"));
            }
        }

        if self.tags.iter().any(String::is_empty) {
            errors.push("Detector tags cannot be empty strings".to_string());
        }

        if !(64..=65_535).contains(&self.snaplen) {
            errors.push(format!(
                "Invalid snaplen: {} (valid range: 64-65535)",
                self.snaplen
            ));
        }

        if self.read_timeout.as_millis() < 10 {
            errors.push("Capture read timeout too short (minimum: 10ms)".to_string());
        }

        if self.stats_interval.as_millis() < 100 {
            errors.push("Stats interval too short (minimum: 100ms)".to_string());
        }

        if self.forward_capacity == 0 {
            errors.push("Forward capacity must be greater than 0".to_string());
        }

        errors
    }
}

/// Pre-admission liveness probe settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LivenessConfig {
    pub enabled: bool,

    /// Ports tried on the phantom; any answer marks it as a real host
    pub probe_ports: Vec<u16>,

    #[serde(with = "duration_serde")]
    pub probe_timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            probe_ports: vec![443],
            probe_timeout: timeout::PROBE_TIMEOUT,
        }
    }
}

impl LivenessConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.enabled {
            return errors;
        }

        if self.probe_ports.is_empty() {
            errors.push("Liveness probe needs at least one port when enabled".to_string());
        }
        if self.probe_ports.contains(&0) {
            errors.push("Liveness probe port cannot be 0".to_string());
        }
        if self.probe_timeout.as_millis() < 10 {
            errors.push("Probe timeout too short (minimum: 10ms)".to_string());
        } else if self.probe_timeout.as_secs() > 10 {
            errors.push("Probe timeout too long (maximum: 10s)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    pub log_to_console: bool,

    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    pub json_format: bool,

    /// Interval between metrics snapshots
    #[serde(with = "duration_serde")]
    pub metrics_interval: Duration,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("phantom-station"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
            metrics_interval: Duration::from_secs(60),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        if self.metrics_interval.as_secs() < 1 {
            errors.push("Metrics interval too short (minimum: 1s)".to_string());
        }

        errors
    }
}

/// Durations as integer milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// `tracing::Level` as a lowercase string
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        level.as_str().to_ascii_lowercase().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        assert!(StationConfig::default().validate().is_empty());
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("STATION_LISTEN_ADDRESS", "127.0.0.1:5000"),
            ("STATION_REGISTRATION_TTL_MS", "1500"),
            ("STATION_DETECTOR_EXCLUDE", "192.0.2.1, 192.0.2.2,"),
            ("STATION_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = StationConfig::default();
        config
            .apply_vars(|key| vars.get(key).map(|v| v.to_string()))
            .expect("apply");

        assert_eq!(config.dispatcher.listen_address, "127.0.0.1:5000");
        assert_eq!(config.registrations.ttl, Duration::from_millis(1500));
        assert_eq!(config.detector.excluded_sources, vec!["192.0.2.1", "192.0.2.2"]);
        assert_eq!(config.logging.log_level, Level::DEBUG);
    }

    #[test]
    fn test_bad_env_value_is_error() {
        let mut config = StationConfig::default();
        let result = config.apply_vars(|key| {
            (key == "STATION_MAX_REGISTRATIONS").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(StationError::ConfigError(_))));
    }
}
