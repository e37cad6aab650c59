//! MQTT implementation of the transport seam
//!
//! Split the way the rest of the crate is: pure state machinery in
//! [`connection`], the lifecycle manager in [`client`], the rumqttc-backed
//! wire link in [`link`], and the liveness announcements in [`status`].

pub mod client;
pub mod connection;
pub mod link;
pub mod status;

pub use client::{ClientHealth, MqttClient};
pub use connection::{ConnectionState, MqttError, RetrySchedule, INITIAL_BACKOFF, MAX_BACKOFF};
pub use link::{BrokerEndpoint, BrokerLink};
pub use status::StatusAnnouncer;
