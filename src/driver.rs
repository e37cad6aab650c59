//! Periodic sampling and publish loop
//!
//! The driver owns the foreground thread: once per interval it gives the
//! connection manager a maintenance tick, samples every configured sensor,
//! publishes the readings, and every Nth iteration emits a retained health
//! frame. Individual publish failures are counted, never fatal.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::TelemetryConfig;
use crate::protocol::payloads::{HealthCounters, HealthPayload, MetricSample, TelemetryPayload};
use crate::protocol::topics;
use crate::sensor::Sensor;
use crate::transport::mqtt::MqttClient;
use crate::transport::{PublishRequest, Qos, Transport};

/// A sensor bound to its telemetry topic suffix.
pub struct SensorEntry {
    pub topic_suffix: String,
    pub sensor: Box<dyn Sensor>,
}

/// Driver-owned counters for the telemetry data path. Mutated only on the
/// driver thread; health/status frames are advisory and not counted here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub publish_ok: u64,
    pub publish_fail: u64,
}

/// The publish-loop driver.
pub struct PublishLoop<T: Transport> {
    client: MqttClient<T>,
    client_id: String,
    qos: Qos,
    retain: bool,
    interval: Duration,
    health_every: u64,
    sensors: Vec<SensorEntry>,
    shutdown: watch::Receiver<bool>,
    counters: Counters,
    seq: u64,
    started: Instant,
}

impl<T: Transport> PublishLoop<T> {
    pub fn new(
        client: MqttClient<T>,
        config: &TelemetryConfig,
        sensors: Vec<SensorEntry>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            client_id: config.device.client_id.clone(),
            qos: config.qos(),
            retain: config.publish.retain,
            interval: config.interval(),
            health_every: config.publish.health_every,
            sensors,
            shutdown,
            counters: Counters::default(),
            seq: 0,
            started: Instant::now(),
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Run one iteration: maintenance tick, sample and publish every sensor,
    /// then a health frame when the sequence lands on a reporting boundary.
    pub fn step(&mut self) {
        self.client.tick();

        for entry in &mut self.sensors {
            let Some(reading) = entry.sensor.sample() else {
                continue;
            };

            let topic = topics::telemetry_topic(&self.client_id, &entry.topic_suffix);
            let payload = TelemetryPayload::new(
                &self.client_id,
                MetricSample {
                    name: reading.metric,
                    unit: reading.unit,
                    value: reading.value,
                },
                self.seq,
            );
            let Ok(body) = serde_json::to_vec(&payload) else {
                self.counters.publish_fail += 1;
                continue;
            };

            let request = PublishRequest {
                topic,
                payload: body.into(),
                qos: self.qos,
                retain: self.retain,
            };
            if self.client.publish(&request) {
                self.counters.publish_ok += 1;
            } else {
                self.counters.publish_fail += 1;
                debug!(topic = %request.topic, "telemetry publish failed");
            }
        }

        self.seq += 1;
        if self.seq % self.health_every == 0 {
            self.publish_health();
        }
    }

    /// Run until the shutdown signal fires. Returns the final counters.
    pub async fn run(mut self) -> Counters {
        info!(
            sensors = self.sensors.len(),
            interval_ms = self.interval.as_millis() as u64,
            "publish loop started"
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            self.step();

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.changed() => {}
            }
        }

        info!(
            publish_ok = self.counters.publish_ok,
            publish_fail = self.counters.publish_fail,
            reconnects = self.client.reconnects(),
            iterations = self.seq,
            "publish loop stopped"
        );
        self.counters
    }

    fn publish_health(&self) {
        let counters = HealthCounters {
            publish_ok: self.counters.publish_ok,
            publish_fail: self.counters.publish_fail,
            reconnects: self.client.reconnects(),
        };
        let payload = HealthPayload::new(
            &self.client_id,
            self.started.elapsed().as_secs(),
            self.seq,
            counters,
        );
        let Ok(body) = serde_json::to_vec(&payload) else {
            return;
        };

        let request = PublishRequest {
            topic: topics::health_topic(&self.client_id),
            payload: body.into(),
            qos: self.qos,
            retain: true,
        };
        // Advisory: a failed health frame is logged, not counted.
        if !self.client.publish(&request) {
            debug!("health publish failed");
        }
    }
}
