//! Connection lifecycle manager for the MQTT session
//!
//! Owns the connection state, the reconnect backoff schedule, and the
//! single-flight guard that keeps concurrent callers from issuing competing
//! reconnect attempts. All calls on the foreground path (`tick`, `publish`)
//! are non-blocking: they either act immediately or skip.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::connection::{ConnectionState, MqttError, RetrySchedule};
use super::status::StatusAnnouncer;
use crate::transport::{EventHook, PublishError, PublishRequest, Transport, TransportEvent};

/// Point-in-time view of the connection for logs and health reporting.
#[derive(Debug, Clone)]
pub struct ClientHealth {
    pub state: ConnectionState,
    pub reconnects: u64,
    /// Current backoff window, when the retry guard was free to sample it.
    pub backoff: Option<Duration>,
    /// Time until the next reconnect attempt, when one is scheduled.
    pub next_attempt_in: Option<Duration>,
}

/// Publish-only MQTT client with automatic reconnection.
///
/// Cloning is cheap and every clone drives the same session.
pub struct MqttClient<T: Transport> {
    inner: Arc<ClientInner<T>>,
}

impl<T: Transport> Clone for MqttClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ClientInner<T: Transport> {
    transport: T,
    announcer: StatusAnnouncer,
    connected: AtomicBool,
    stopping: AtomicBool,
    started: AtomicBool,
    reconnects: AtomicU64,
    retry: Mutex<RetrySchedule>,
}

impl<T: Transport> MqttClient<T> {
    pub fn new(transport: T, announcer: StatusAnnouncer) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                announcer,
                connected: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                started: AtomicBool::new(false),
                reconnects: AtomicU64::new(0),
                retry: Mutex::new(RetrySchedule::new()),
            }),
        }
    }

    /// Register the last will and start the transport worker with the
    /// initial asynchronous connect request. Returns without waiting for
    /// the broker's acknowledgment, which arrives through the event hook.
    ///
    /// One-shot: a second call fails with [`MqttError::AlreadyStarted`].
    pub fn connect(&self, keepalive: Duration) -> Result<(), MqttError> {
        let inner = &self.inner;
        if inner.stopping.load(Ordering::Relaxed) {
            return Err(MqttError::Stopped);
        }
        if inner
            .started
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return Err(MqttError::AlreadyStarted);
        }

        inner.transport.set_last_will(inner.announcer.last_will());

        let weak = Arc::downgrade(inner);
        let hook: EventHook = Box::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_event(event);
            }
        });

        if let Err(err) = inner.transport.start(keepalive, hook) {
            inner.started.store(false, Ordering::Relaxed);
            return Err(err.into());
        }

        info!(client_id = inner.announcer.client_id(), "connect requested");
        Ok(())
    }

    /// Non-blocking maintenance call, invoked once per driver iteration.
    /// Cheap when connected; otherwise drives the reconnect schedule.
    pub fn tick(&self) {
        self.inner.tick_reconnect();
    }

    /// Publish one message, best effort.
    ///
    /// When disconnected this kicks the reconnect logic and fails (the
    /// connect outcome is asynchronous); the payload is never queued.
    pub fn publish(&self, request: &PublishRequest) -> bool {
        let inner = &self.inner;
        if inner.stopping.load(Ordering::Relaxed) {
            return false;
        }
        if !inner.ensure_connected() {
            return false;
        }

        match inner.transport.publish(request) {
            Ok(()) => true,
            Err(PublishError::NoSession) => {
                // The transport noticed the drop before we did.
                inner.connected.store(false, Ordering::Relaxed);
                inner.tick_reconnect();
                false
            }
            Err(PublishError::Rejected(reason)) => {
                error!(topic = %request.topic, %reason, "publish rejected by transport");
                false
            }
        }
    }

    /// Stop the client: publish the retained offline status while still
    /// connected, disconnect cleanly, and halt the transport worker.
    ///
    /// Idempotent; afterwards `tick` and `publish` are refusing no-ops.
    pub async fn stop(&self) {
        let inner = &self.inner;
        if inner.stopping.swap(true, Ordering::Relaxed) {
            return;
        }

        if inner.connected.load(Ordering::Relaxed) {
            inner.announcer.announce_offline(&inner.transport);
        }

        inner.transport.shutdown().await;
        inner.connected.store(false, Ordering::Relaxed);
        inner.started.store(false, Ordering::Relaxed);
        info!(client_id = inner.announcer.client_id(), "mqtt client stopped");
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    /// Total reconnect attempts issued since startup. Monotone.
    pub fn reconnects(&self) -> u64 {
        self.inner.reconnects.load(Ordering::Relaxed)
    }

    pub fn client_id(&self) -> &str {
        self.inner.announcer.client_id()
    }

    /// Derived lifecycle state, for logs and health reporting.
    pub fn state(&self) -> ConnectionState {
        let inner = &self.inner;
        if inner.stopping.load(Ordering::Relaxed) {
            if inner.started.load(Ordering::Relaxed) {
                ConnectionState::Stopping
            } else {
                ConnectionState::Stopped
            }
        } else if inner.connected.load(Ordering::Relaxed) {
            ConnectionState::Connected
        } else if inner.started.load(Ordering::Relaxed) {
            // A scheduled retry means a disconnect was observed; otherwise
            // the requested connect is still in flight.
            match inner.retry.try_lock() {
                Ok(retry) if retry.next_attempt().is_some() => ConnectionState::Disconnected,
                _ => ConnectionState::Connecting,
            }
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn health_snapshot(&self) -> ClientHealth {
        let inner = &self.inner;
        let (backoff, next_attempt_in) = match inner.retry.try_lock() {
            Ok(retry) => {
                let now = Instant::now();
                (
                    Some(retry.backoff()),
                    retry.next_attempt().map(|at| at.saturating_duration_since(now)),
                )
            }
            Err(_) => (None, None),
        };
        ClientHealth {
            state: self.state(),
            reconnects: self.reconnects(),
            backoff,
            next_attempt_in,
        }
    }
}

impl<T: Transport> ClientInner<T> {
    /// Re-check connectivity, kicking the reconnect logic when down.
    fn ensure_connected(&self) -> bool {
        if self.connected.load(Ordering::Relaxed) {
            return true;
        }
        self.tick_reconnect();
        self.connected.load(Ordering::Relaxed)
    }

    /// At most one reconnect attempt per retry window, regardless of how
    /// many threads call in: a contended guard means someone else is already
    /// handling it, so the caller skips instead of waiting.
    fn tick_reconnect(&self) {
        if self.stopping.load(Ordering::Relaxed) {
            return;
        }
        if self.connected.load(Ordering::Relaxed) {
            return;
        }

        let Ok(mut retry) = self.retry.try_lock() else {
            return;
        };

        if self.connected.load(Ordering::Relaxed) {
            // Connected while we were acquiring the guard.
            retry.reset();
            return;
        }

        let now = Instant::now();
        if !retry.due(now) {
            return;
        }

        match self.transport.request_reconnect() {
            Ok(()) => {
                let attempt = self.reconnects.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(attempt, backoff_s = retry.backoff().as_secs(), "reconnect requested");
            }
            Err(err) => {
                error!(%err, "failed to queue reconnect request");
            }
        }
        // The connect outcome is asynchronous and reported via the event
        // hook; schedule the next window either way.
        retry.attempt_made(now);
    }

    fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                self.connected.store(true, Ordering::Relaxed);
                // Reset the retry window right away so the next disconnect
                // starts from the shortest backoff.
                let mut retry = self
                    .retry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                retry.reset();
                drop(retry);

                info!("connected to broker");
                self.announcer.announce_online(&self.transport);
            }
            TransportEvent::ConnectFailed(reason) => {
                self.connected.store(false, Ordering::Relaxed);
                error!(%reason, "broker connect failed");
            }
            TransportEvent::ConnectionLost(reason) => {
                self.connected.store(false, Ordering::Relaxed);
                if self.stopping.load(Ordering::Relaxed) {
                    info!(%reason, "disconnected cleanly");
                } else {
                    warn!(%reason, "connection lost, scheduling reconnect");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockTransport;
    use crate::transport::Qos;
    use bytes::Bytes;

    fn test_client(transport: MockTransport) -> MqttClient<MockTransport> {
        let announcer = StatusAnnouncer::new("test-device", Qos::AtLeastOnce).unwrap();
        MqttClient::new(transport, announcer)
    }

    fn request() -> PublishRequest {
        PublishRequest {
            topic: "devices/test-device/temperature".to_string(),
            payload: Bytes::from_static(b"{}"),
            qos: Qos::AtLeastOnce,
            retain: false,
        }
    }

    #[test]
    fn test_connect_registers_last_will_before_start() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());

        client.connect(Duration::from_secs(60)).unwrap();

        let will = transport.will().expect("last will registered");
        assert_eq!(will.topic, "devices/test-device/status");
        assert!(will.retain);
        assert!(transport.started());
    }

    #[test]
    fn test_connect_twice_fails() {
        let transport = MockTransport::new();
        let client = test_client(transport);

        client.connect(Duration::from_secs(60)).unwrap();
        assert!(matches!(
            client.connect(Duration::from_secs(60)),
            Err(MqttError::AlreadyStarted)
        ));
    }

    #[test]
    fn test_connected_event_publishes_online_status() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.connect(Duration::from_secs(60)).unwrap();

        transport.set_session(true);
        transport.fire(TransportEvent::Connected);

        assert!(client.is_connected());
        let statuses = transport.published_on("devices/test-device/status");
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].retain);
    }

    #[test]
    fn test_tick_when_connected_is_cheap_noop() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.connect(Duration::from_secs(60)).unwrap();
        transport.set_session(true);
        transport.fire(TransportEvent::Connected);

        client.tick();
        assert_eq!(transport.reconnect_requests(), 0);
    }

    #[test]
    fn test_tick_disconnected_attempts_once_per_window() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.connect(Duration::from_secs(60)).unwrap();

        client.tick();
        assert_eq!(transport.reconnect_requests(), 1);
        assert_eq!(client.reconnects(), 1);

        // Still inside the one-second window: nothing more is issued.
        client.tick();
        client.tick();
        assert_eq!(transport.reconnect_requests(), 1);
    }

    #[test]
    fn test_backoff_resets_when_connection_observed() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.connect(Duration::from_secs(60)).unwrap();

        client.tick();
        let widened = client.health_snapshot().backoff.unwrap();
        assert_eq!(widened, Duration::from_secs(2));

        transport.set_session(true);
        transport.fire(TransportEvent::Connected);

        let health = client.health_snapshot();
        assert_eq!(health.backoff, Some(Duration::from_secs(1)));
        assert_eq!(health.next_attempt_in, None);
    }

    #[test]
    fn test_publish_disconnected_kicks_reconnect_and_fails() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.connect(Duration::from_secs(60)).unwrap();

        assert!(!client.publish(&request()));
        assert_eq!(transport.reconnect_requests(), 1);
        assert!(transport.published().is_empty());
    }

    #[test]
    fn test_publish_no_session_flips_state_and_fails() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.connect(Duration::from_secs(60)).unwrap();
        transport.set_session(true);
        transport.fire(TransportEvent::Connected);

        // The broker session evaporates without a callback yet.
        transport.set_session(false);

        assert!(!client.publish(&request()));
        assert!(!client.is_connected());
        assert_eq!(transport.reconnect_requests(), 1);
    }

    #[test]
    fn test_publish_rejected_fails_without_state_change() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.connect(Duration::from_secs(60)).unwrap();
        transport.set_session(true);
        transport.fire(TransportEvent::Connected);

        transport.fail_next_publish();
        assert!(!client.publish(&request()));

        assert!(client.is_connected());
        assert_eq!(transport.reconnect_requests(), 0);
    }

    #[test]
    fn test_connection_lost_marks_disconnected() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.connect(Duration::from_secs(60)).unwrap();
        transport.set_session(true);
        transport.fire(TransportEvent::Connected);
        assert!(client.is_connected());

        transport.set_session(false);
        transport.fire(TransportEvent::ConnectionLost("keepalive timeout".into()));

        assert!(!client.is_connected());
        assert_eq!(client.state(), ConnectionState::Connecting);

        // Next tick issues exactly one attempt, then the window applies.
        client.tick();
        client.tick();
        assert_eq!(transport.reconnect_requests(), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stop_publishes_offline_and_is_idempotent() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.connect(Duration::from_secs(60)).unwrap();
        transport.set_session(true);
        transport.fire(TransportEvent::Connected);

        client.stop().await;
        client.stop().await;

        assert_eq!(transport.shutdown_calls(), 1);
        let statuses = transport.published_on("devices/test-device/status");
        // Online from the connect event, offline from stop.
        assert_eq!(statuses.len(), 2);
        let last: serde_json::Value = serde_json::from_slice(&statuses[1].payload).unwrap();
        assert_eq!(last["state"], "offline");
        assert!(statuses[1].retain);
        assert_eq!(client.state(), ConnectionState::Stopped);
    }

    #[tokio::test]
    async fn test_calls_after_stop_are_refusing_noops() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.connect(Duration::from_secs(60)).unwrap();
        client.stop().await;

        client.tick();
        assert!(!client.publish(&request()));
        assert_eq!(transport.reconnect_requests(), 0);
        assert!(matches!(
            client.connect(Duration::from_secs(60)),
            Err(MqttError::Stopped)
        ));
    }

    #[test]
    fn test_state_before_connect_is_disconnected() {
        let client = test_client(MockTransport::new());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_connected());
        assert_eq!(client.reconnects(), 0);
    }
}
