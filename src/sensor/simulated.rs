//! Deterministic ramp generator used when no hardware is attached

use super::{Reading, Sensor, SensorError};

/// Emits `start + step * n` for n = 0, 1, 2, ...
pub struct SimulatedSensor {
    metric: String,
    unit: String,
    start: f64,
    step: f64,
    n: u64,
}

impl SimulatedSensor {
    pub fn new(metric: &str, unit: &str, start: f64, step: f64) -> Self {
        Self {
            metric: metric.to_string(),
            unit: unit.to_string(),
            start,
            step,
            n: 0,
        }
    }
}

impl Sensor for SimulatedSensor {
    fn init(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn sample(&mut self) -> Option<Reading> {
        let value = self.start + self.step * self.n as f64;
        self.n += 1;
        Some(Reading {
            metric: self.metric.clone(),
            unit: self.unit.clone(),
            value,
        })
    }

    fn name(&self) -> &str {
        &self.metric
    }
}
