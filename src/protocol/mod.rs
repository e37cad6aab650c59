//! Wire contract for the telemetry fleet
//!
//! Topic layout and payload schemas shared with the dashboards and alerting
//! jobs that subscribe to this daemon's output. Field names are load-bearing;
//! see the individual payload types before changing anything here.

pub mod payloads;
pub mod topics;

pub use payloads::{
    DeviceRef, DeviceState, HealthCounters, HealthPayload, MetricSample, StatusPayload,
    TelemetryPayload,
};
pub use topics::{health_topic, status_topic, telemetry_topic};
