//! Payload schemas for status, telemetry, and health messages
//!
//! All payloads are JSON objects carrying a version marker and a `device`
//! block identifying the publisher. Downstream consumers match on these
//! field names, so the shapes here are frozen.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current unix time in whole seconds.
pub fn unix_time_s() -> i64 {
    Utc::now().timestamp()
}

/// Identifies the publishing device inside every payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceRef {
    pub client_id: String,
}

/// Liveness state carried by [`StatusPayload`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Online,
    Offline,
}

/// Retained liveness record published on the status subtopic.
///
/// `scheme_version` is not a typo for `schema_version`: status consumers
/// shipped against this spelling and both must keep parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusPayload {
    pub scheme_version: u32,
    pub device: DeviceRef,
    pub state: DeviceState,
    pub timestamp_s: i64,
}

impl StatusPayload {
    pub fn new(client_id: &str, state: DeviceState) -> Self {
        Self {
            scheme_version: 1,
            device: DeviceRef {
                client_id: client_id.to_string(),
            },
            state,
            timestamp_s: unix_time_s(),
        }
    }
}

/// One sampled metric inside a telemetry payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub unit: String,
    pub value: f64,
}

/// Telemetry frame published on `devices/<client_id>/<metric_suffix>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryPayload {
    pub schema_version: u32,
    pub device: DeviceRef,
    pub metric: MetricSample,
    pub timestamp_s: i64,
    pub seq: u64,
}

impl TelemetryPayload {
    pub fn new(client_id: &str, metric: MetricSample, seq: u64) -> Self {
        Self {
            schema_version: 1,
            device: DeviceRef {
                client_id: client_id.to_string(),
            },
            metric,
            timestamp_s: unix_time_s(),
            seq,
        }
    }
}

/// Process-lifetime counters reported in the health frame.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthCounters {
    pub publish_ok: u64,
    pub publish_fail: u64,
    pub reconnects: u64,
}

/// Periodic retained health frame published on `devices/<client_id>/health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthPayload {
    pub schema_version: u32,
    pub device: DeviceRef,
    pub uptime_s: u64,
    pub seq: u64,
    pub counters: HealthCounters,
    pub timestamp_s: i64,
}

impl HealthPayload {
    pub fn new(client_id: &str, uptime_s: u64, seq: u64, counters: HealthCounters) -> Self {
        Self {
            schema_version: 1,
            device: DeviceRef {
                client_id: client_id.to_string(),
            },
            uptime_s,
            seq,
            counters,
            timestamp_s: unix_time_s(),
        }
    }
}
