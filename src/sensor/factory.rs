//! Sensor construction keyed by the config `type` string

use tracing::warn;

use super::{Sensor, SimulatedSensor};
use crate::config::MetricConfig;

/// Build the sensor for a metric entry. An unrecognized type falls back to
/// the simulated implementation with a warning rather than failing startup.
pub fn build_sensor(metric: &MetricConfig) -> Box<dyn Sensor> {
    match metric.kind.as_str() {
        "simulated" => Box::new(SimulatedSensor::new(
            &metric.name,
            &metric.unit,
            metric.start,
            metric.step,
        )),
        // Future: "gpio", "i2c", ... once real backends exist.
        other => {
            warn!(
                kind = other,
                metric = %metric.name,
                "unknown sensor type, falling back to simulated"
            );
            Box::new(SimulatedSensor::new(
                &metric.name,
                &metric.unit,
                metric.start,
                metric.step,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(kind: &str) -> MetricConfig {
        MetricConfig {
            name: "temperature".to_string(),
            unit: "C".to_string(),
            start: 20.0,
            step: 0.5,
            topic_suffix: "temperature".to_string(),
            kind: kind.to_string(),
        }
    }

    #[test]
    fn test_simulated_type_builds_ramp() {
        let mut sensor = build_sensor(&metric("simulated"));
        assert_eq!(sensor.sample().unwrap().value, 20.0);
        assert_eq!(sensor.sample().unwrap().value, 20.5);
    }

    #[test]
    fn test_unknown_type_falls_back_to_simulated() {
        let mut sensor = build_sensor(&metric("thermocouple-9000"));
        // Behaves exactly like the simulated ramp.
        assert_eq!(sensor.name(), "temperature");
        assert_eq!(sensor.sample().unwrap().value, 20.0);
    }
}
