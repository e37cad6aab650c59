//! telemetryd - resilient publish-only MQTT telemetry daemon
//!
//! Maintains a persistent session to an MQTT broker over an unreliable
//! network, survives disconnects with capped exponential backoff, and
//! announces its own liveness through a retained status topic backed by a
//! broker-side last will.
//!
//! # Overview
//!
//! - [`transport::mqtt::MqttClient`]: connection lifecycle manager with
//!   non-blocking `tick`/`publish` and single-flight reconnection
//! - [`transport::mqtt::StatusAnnouncer`]: retained online/offline records
//!   plus the last-will registration
//! - [`driver::PublishLoop`]: periodic sampling loop with health reporting
//! - [`transport::Transport`]: the seam to the wire library, mockable in
//!   tests via [`testing::MockTransport`]
//!
//! # Quick Start
//!
//! ```rust
//! use telemetryd::protocol::{DeviceState, StatusPayload};
//!
//! // The retained liveness record published on devices/<client_id>/status.
//! let status = StatusPayload::new("pi-sim-01", DeviceState::Online);
//! let json = serde_json::to_string(&status).unwrap();
//! assert!(json.contains("\"scheme_version\":1"));
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod sensor;
pub mod testing;
pub mod transport;

pub use config::TelemetryConfig;
pub use driver::{Counters, PublishLoop, SensorEntry};
pub use error::{TelemetryError, TelemetryResult};
pub use transport::mqtt::{BrokerEndpoint, BrokerLink, MqttClient, StatusAnnouncer};
