//! Sensor abstraction producing numeric readings
//!
//! The publish loop polls each configured sensor once per iteration. Sensors
//! are built from the `[[metrics]]` config entries through [`build_sensor`],
//! keyed by the entry's `type` string.

pub mod factory;
pub mod simulated;

pub use factory::build_sensor;
pub use simulated::SimulatedSensor;

use thiserror::Error;

/// One sampled value.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub metric: String,
    pub unit: String,
    pub value: f64,
}

/// A source of readings polled by the publish loop.
pub trait Sensor: Send {
    /// One-time initialization before the loop starts.
    fn init(&mut self) -> Result<(), SensorError>;

    /// Produce the next reading, or `None` when nothing is available this
    /// cycle.
    fn sample(&mut self) -> Option<Reading>;

    fn name(&self) -> &str;
}

#[derive(Debug, Error)]
#[error("sensor {name} failed to initialize: {reason}")]
pub struct SensorError {
    pub name: String,
    pub reason: String,
}
