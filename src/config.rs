//! Configuration for the telemetry daemon
//!
//! Loaded from a TOML file and validated up front: a bad configuration is
//! fatal at startup and never retried.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::topics;
use crate::transport::Qos;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// Log level: trace, debug, info, warn, error. Unrecognized values fall
    /// back to info with a warning.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub device: DeviceSection,
    pub broker: BrokerSection,
    #[serde(default)]
    pub publish: PublishSection,
    pub metrics: Vec<MetricConfig>,
}

/// Identity of this device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Client identifier, unique per broker (must match `[a-zA-Z0-9._-]+`).
    pub client_id: String,
}

/// Broker endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker URL, `mqtt://host[:port]` or `mqtts://host[:port]`.
    pub url: String,
    /// Keepalive interval in seconds handed to the transport.
    #[serde(default = "default_keepalive_s")]
    pub keepalive_s: u64,
}

/// Publish-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishSection {
    /// Sampling period in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// QoS for telemetry publishes (0, 1, or 2).
    #[serde(default = "default_qos")]
    pub qos: u8,
    /// Retain flag for telemetry publishes. Status and health frames are
    /// always retained.
    #[serde(default)]
    pub retain: bool,
    /// Publish a health frame every N iterations.
    #[serde(default = "default_health_every")]
    pub health_every: u64,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            qos: default_qos(),
            retain: false,
            health_every: default_health_every(),
        }
    }
}

/// One metric entry: what to sample and where to publish it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricConfig {
    pub name: String,
    #[serde(default)]
    pub unit: String,
    /// Ramp origin for the simulated sensor.
    #[serde(default)]
    pub start: f64,
    /// Ramp increment per sample for the simulated sensor.
    #[serde(default)]
    pub step: f64,
    /// Topic suffix under `devices/<client_id>/`.
    pub topic_suffix: String,
    /// Sensor backend, resolved by the sensor factory.
    #[serde(default = "default_sensor_kind", rename = "type")]
    pub kind: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_keepalive_s() -> u64 {
    60
}

fn default_interval_ms() -> u64 {
    100
}

fn default_qos() -> u8 {
    1
}

fn default_health_every() -> u64 {
    5
}

fn default_sensor_kind() -> String {
    "simulated".to_string()
}

/// Configuration loading errors. All fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to render TOML: {0}")]
    TomlRender(#[from] toml::ser::Error),
    #[error("invalid client ID: {0:?} (must match [a-zA-Z0-9._-]+)")]
    InvalidClientId(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TelemetryConfig {
    /// Load and validate a configuration file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: TelemetryConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_client_id(&self.device.client_id)?;

        if self.publish.interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "interval_ms must be > 0".to_string(),
            ));
        }
        if self.publish.qos > 2 {
            return Err(ConfigError::InvalidConfig(
                "qos must be 0, 1, or 2".to_string(),
            ));
        }
        if self.publish.health_every == 0 {
            return Err(ConfigError::InvalidConfig(
                "health_every must be > 0".to_string(),
            ));
        }
        if self.metrics.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "metrics must contain at least one entry".to_string(),
            ));
        }

        for metric in &self.metrics {
            if metric.name.is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "metric name must not be empty".to_string(),
                ));
            }
            if metric.topic_suffix.is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "metric {:?}: topic_suffix must not be empty",
                    metric.name
                )));
            }
            if topics::is_reserved_suffix(&metric.topic_suffix) {
                return Err(ConfigError::InvalidConfig(format!(
                    "metric {:?}: topic_suffix {:?} is reserved",
                    metric.name, metric.topic_suffix
                )));
            }
            if metric.topic_suffix.contains(['+', '#']) {
                return Err(ConfigError::InvalidConfig(format!(
                    "metric {:?}: topic_suffix must not contain MQTT wildcards",
                    metric.name
                )));
            }
        }

        Ok(())
    }

    /// Telemetry QoS as a transport level. Valid after `validate`.
    pub fn qos(&self) -> Qos {
        Qos::from_u8(self.publish.qos).unwrap_or(Qos::AtLeastOnce)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.publish.interval_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.broker.keepalive_s)
    }

    /// Create a test configuration for unit testing.
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
client_id = "pi-sim-01"

[broker]
url = "mqtt://localhost:1883"

[[metrics]]
name = "temperature"
unit = "C"
start = 20.0
step = 0.5
topic_suffix = "temperature"
"#;
        toml::from_str(toml_content).expect("test config should parse")
    }
}

fn validate_client_id(client_id: &str) -> Result<(), ConfigError> {
    let valid_chars = client_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if client_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidClientId(client_id.to_string()));
    }

    Ok(())
}
