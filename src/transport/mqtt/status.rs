//! Retained liveness announcements and the broker-side last will
//!
//! A device is "online" while it holds a session and has said so, "offline"
//! once it leaves cleanly — or, if it vanishes without a clean disconnect,
//! when the broker publishes the registered last will on its behalf. All
//! three paths use the same retained status topic so late subscribers always
//! see the most recent state.

use bytes::Bytes;
use tracing::debug;

use crate::protocol::payloads::{DeviceState, StatusPayload};
use crate::protocol::topics;
use crate::transport::{LastWill, PublishRequest, Qos, Transport};

/// Builds and publishes the per-client status records.
///
/// Both payloads are rendered once at construction; their `timestamp_s`
/// records setup time and is not refreshed on later (re)connects.
pub struct StatusAnnouncer {
    client_id: String,
    topic: String,
    qos: Qos,
    online: Bytes,
    offline: Bytes,
}

impl StatusAnnouncer {
    pub fn new(client_id: &str, qos: Qos) -> Result<Self, serde_json::Error> {
        let topic = topics::status_topic(client_id);
        let online = serde_json::to_vec(&StatusPayload::new(client_id, DeviceState::Online))?;
        let offline = serde_json::to_vec(&StatusPayload::new(client_id, DeviceState::Offline))?;

        Ok(Self {
            client_id: client_id.to_string(),
            topic,
            qos,
            online: Bytes::from(online),
            offline: Bytes::from(offline),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The offline record, registered with the transport before connecting
    /// so the broker announces the disconnect if this process vanishes.
    pub fn last_will(&self) -> LastWill {
        LastWill {
            topic: self.topic.clone(),
            payload: self.offline.clone(),
            qos: self.qos,
            retain: true,
        }
    }

    /// Publish the retained online record. Best effort: skipped when there
    /// is no session, never retried.
    pub fn announce_online<T: Transport>(&self, transport: &T) {
        self.announce(transport, &self.online, "online");
    }

    /// Publish the retained offline record, same best-effort rules.
    pub fn announce_offline<T: Transport>(&self, transport: &T) {
        self.announce(transport, &self.offline, "offline");
    }

    fn announce<T: Transport>(&self, transport: &T, payload: &Bytes, state: &str) {
        let request = PublishRequest {
            topic: self.topic.clone(),
            payload: payload.clone(),
            qos: self.qos,
            retain: true,
        };
        if let Err(err) = transport.publish(&request) {
            debug!(state, %err, "status publish skipped");
        }
    }
}
