//! Transport layer for broker communication
//!
//! This module defines the seam between the connection manager and the MQTT
//! wire library. The [`Transport`] trait captures exactly what the manager
//! needs from a broker session — register a last will, start a background
//! worker, queue asynchronous (re)connect requests, hand off publishes
//! without blocking — so tests can drive the manager against a mock.

use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

pub mod mqtt;

/// Quality-of-service level for published messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    /// Fire and forget.
    AtMostOnce,
    /// Delivered at least once, may duplicate.
    AtLeastOnce,
    /// Delivered exactly once.
    ExactlyOnce,
}

impl Qos {
    /// Map a numeric config value (0/1/2) to a QoS level.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Qos::AtMostOnce),
            1 => Some(Qos::AtLeastOnce),
            2 => Some(Qos::ExactlyOnce),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
            Qos::ExactlyOnce => 2,
        }
    }
}

/// A message handed to the transport for delivery.
///
/// Ephemeral: the transport either queues it immediately or the call fails;
/// nothing is retained on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub topic: String,
    pub payload: Bytes,
    pub qos: Qos,
    pub retain: bool,
}

/// Broker-enforced disconnect announcement.
///
/// Registered with the transport before connecting; the broker publishes it
/// on the client's behalf if the session drops without a clean disconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct LastWill {
    pub topic: String,
    pub payload: Bytes,
    pub qos: Qos,
    pub retain: bool,
}

/// Connection transitions reported from the transport's background worker.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The broker acknowledged the session.
    Connected,
    /// A connect or reconnect request was refused or failed in flight.
    ConnectFailed(String),
    /// An established session dropped.
    ConnectionLost(String),
}

/// Callback routing worker events back to the owning client.
pub type EventHook = Box<dyn Fn(TransportEvent) + Send + Sync>;

/// Failures initializing or steering the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid client identity: {0:?}")]
    InvalidIdentity(String),
    #[error("invalid broker endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("transport worker already started")]
    AlreadyStarted,
    #[error("transport worker not running")]
    NotRunning,
    #[error("failed to queue {operation} request")]
    QueueClosed { operation: &'static str },
}

/// Per-call publish failures.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no active broker session")]
    NoSession,
    #[error("publish rejected: {0}")]
    Rejected(String),
}

/// One outbound broker session.
///
/// Calls from the foreground thread never block on network I/O: `start` and
/// `request_reconnect` queue asynchronous requests whose outcomes arrive
/// through the event hook, and `publish` is a non-blocking hand-off.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Register the disconnect announcement. Must be called before `start`.
    fn set_last_will(&self, will: LastWill);

    /// Spawn the background worker and queue the initial connect request.
    /// Does not wait for the broker's acknowledgment.
    fn start(&self, keepalive: Duration, on_event: EventHook) -> Result<(), TransportError>;

    /// Queue an asynchronous reconnect request.
    fn request_reconnect(&self) -> Result<(), TransportError>;

    /// Hand a message to the transport queue without blocking.
    fn publish(&self, request: &PublishRequest) -> Result<(), PublishError>;

    /// Request a clean disconnect, then stop the worker and wait for it.
    async fn shutdown(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_mapping() {
        assert_eq!(Qos::from_u8(0), Some(Qos::AtMostOnce));
        assert_eq!(Qos::from_u8(1), Some(Qos::AtLeastOnce));
        assert_eq!(Qos::from_u8(2), Some(Qos::ExactlyOnce));
        assert_eq!(Qos::from_u8(3), None);

        for value in 0..=2 {
            assert_eq!(Qos::from_u8(value).map(Qos::as_u8), Some(value));
        }
    }

    #[test]
    fn test_error_display_is_nonempty() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(TransportError::InvalidIdentity(String::new())),
            Box::new(TransportError::InvalidEndpoint("bad".to_string())),
            Box::new(TransportError::AlreadyStarted),
            Box::new(TransportError::NotRunning),
            Box::new(TransportError::QueueClosed {
                operation: "reconnect",
            }),
            Box::new(PublishError::NoSession),
            Box::new(PublishError::Rejected("queue full".to_string())),
        ];
        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
