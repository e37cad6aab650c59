//! Error types for the telemetry daemon
//!
//! Configuration and transport-initialization failures are fatal at startup;
//! everything on the publish path is converted to a boolean plus a log line
//! at the connection-manager boundary and never unwinds further.

use thiserror::Error;

/// Top-level error type for daemon operations.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("mqtt client error: {0}")]
    Mqtt(#[from] crate::transport::mqtt::MqttError),

    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("sensor error: {0}")]
    Sensor(#[from] crate::sensor::SensorError),

    #[error("status payload serialization failed: {0}")]
    StatusPayload(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for daemon operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::transport::TransportError;

    #[test]
    fn test_error_conversions_and_display() {
        let config: TelemetryError =
            ConfigError::InvalidConfig("qos must be 0, 1, or 2".to_string()).into();
        assert!(config.to_string().contains("configuration error"));

        let transport: TelemetryError = TransportError::NotRunning.into();
        assert!(transport.to_string().contains("transport error"));
    }
}
