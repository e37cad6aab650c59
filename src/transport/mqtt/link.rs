//! rumqttc-backed broker link
//!
//! The impure half of the transport: owns the background worker task that
//! drives the MQTT event loop and reports connection transitions back to the
//! owning client through the registered event hook. Reconnect requests tear
//! down the current session and perform a fresh handshake, so a stale
//! half-open connection never lingers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, LastWill as MqttLastWill, Packet};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::transport::{
    EventHook, LastWill, PublishError, PublishRequest, Qos, Transport, TransportError,
    TransportEvent,
};

/// Capacity of the rumqttc request queue per session.
const REQUEST_QUEUE_CAP: usize = 16;

/// Broker endpoint resolved from the configured URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerEndpoint {
    /// Parse a `mqtt://` or `mqtts://` URL, filling in the default port for
    /// the scheme when none is given.
    pub fn parse(broker_url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(broker_url)
            .map_err(|_| TransportError::InvalidEndpoint(broker_url.to_string()))?;

        let tls = match url.scheme() {
            "mqtt" => false,
            "mqtts" => true,
            _ => return Err(TransportError::InvalidEndpoint(broker_url.to_string())),
        };
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidEndpoint(broker_url.to_string()))?
            .to_string();
        let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

        Ok(Self { host, port, tls })
    }
}

/// Validate the client identity the broker will see.
fn validate_client_id(client_id: &str) -> Result<(), TransportError> {
    let valid = !client_id.is_empty()
        && client_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(TransportError::InvalidIdentity(client_id.to_string()))
    }
}

fn map_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
        Qos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

fn lock_ignore_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum LinkCommand {
    /// Build a session and perform a handshake (initial connect and every
    /// reconnect request).
    Connect,
    Shutdown,
}

/// One outbound broker session over rumqttc.
pub struct BrokerLink {
    endpoint: BrokerEndpoint,
    client_id: String,
    will: Mutex<Option<LastWill>>,
    session_up: Arc<AtomicBool>,
    client: Arc<Mutex<Option<AsyncClient>>>,
    cmd_tx: Mutex<Option<mpsc::UnboundedSender<LinkCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BrokerLink {
    /// Allocate a session handle for this identity. Fails if the identity is
    /// not broker-safe.
    pub fn open(endpoint: BrokerEndpoint, client_id: &str) -> Result<Self, TransportError> {
        validate_client_id(client_id)?;
        Ok(Self {
            endpoint,
            client_id: client_id.to_string(),
            will: Mutex::new(None),
            session_up: Arc::new(AtomicBool::new(false)),
            client: Arc::new(Mutex::new(None)),
            cmd_tx: Mutex::new(None),
            worker: Mutex::new(None),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[async_trait::async_trait]
impl Transport for BrokerLink {
    fn set_last_will(&self, will: LastWill) {
        *lock_ignore_poison(&self.will) = Some(will);
    }

    fn start(&self, keepalive: Duration, on_event: EventHook) -> Result<(), TransportError> {
        let mut slot = lock_ignore_poison(&self.cmd_tx);
        if slot.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(LinkCommand::Connect)
            .map_err(|_| TransportError::QueueClosed {
                operation: "connect",
            })?;

        let worker = Worker {
            endpoint: self.endpoint.clone(),
            client_id: self.client_id.clone(),
            will: lock_ignore_poison(&self.will).clone(),
            keepalive,
            session_up: Arc::clone(&self.session_up),
            client: Arc::clone(&self.client),
            on_event,
        };
        let handle = tokio::spawn(worker.run(rx));

        *slot = Some(tx);
        *lock_ignore_poison(&self.worker) = Some(handle);
        Ok(())
    }

    fn request_reconnect(&self) -> Result<(), TransportError> {
        let slot = lock_ignore_poison(&self.cmd_tx);
        let tx = slot.as_ref().ok_or(TransportError::NotRunning)?;
        tx.send(LinkCommand::Connect)
            .map_err(|_| TransportError::QueueClosed {
                operation: "reconnect",
            })
    }

    fn publish(&self, request: &PublishRequest) -> Result<(), PublishError> {
        if !self.session_up.load(Ordering::Relaxed) {
            return Err(PublishError::NoSession);
        }
        let guard = lock_ignore_poison(&self.client);
        let client = guard.as_ref().ok_or(PublishError::NoSession)?;
        client
            .try_publish(
                request.topic.clone(),
                map_qos(request.qos),
                request.retain,
                request.payload.clone(),
            )
            .map_err(|err| PublishError::Rejected(err.to_string()))
    }

    async fn shutdown(&self) {
        // Queue a clean DISCONNECT so the broker suppresses the last will.
        let client = lock_ignore_poison(&self.client).take();
        if let Some(client) = client {
            let _ = client.disconnect().await;
        }

        let tx = lock_ignore_poison(&self.cmd_tx).take();
        if let Some(tx) = tx {
            let _ = tx.send(LinkCommand::Shutdown);
        }

        let handle = lock_ignore_poison(&self.worker).take();
        if let Some(handle) = handle {
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => debug!("transport worker stopped"),
                Ok(Err(err)) if !err.is_cancelled() => {
                    warn!(%err, "transport worker ended with error");
                }
                Err(_) => warn!("transport worker did not stop in time"),
                _ => {}
            }
        }

        self.session_up.store(false, Ordering::Relaxed);
    }
}

enum SessionEnd {
    /// Handshake failed or the session dropped; wait for the next command.
    Dropped,
    /// A reconnect request arrived mid-session; rebuild immediately.
    Rebuild,
    Shutdown,
}

struct Worker {
    endpoint: BrokerEndpoint,
    client_id: String,
    will: Option<LastWill>,
    keepalive: Duration,
    session_up: Arc<AtomicBool>,
    client: Arc<Mutex<Option<AsyncClient>>>,
    on_event: EventHook,
}

impl Worker {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<LinkCommand>) {
        loop {
            match commands.recv().await {
                Some(LinkCommand::Connect) => loop {
                    match self.run_session(&mut commands).await {
                        SessionEnd::Rebuild => continue,
                        SessionEnd::Dropped => break,
                        SessionEnd::Shutdown => return,
                    }
                },
                Some(LinkCommand::Shutdown) | None => return,
            }
        }
    }

    /// Drive one session from handshake to teardown.
    async fn run_session(&self, commands: &mut mpsc::UnboundedReceiver<LinkCommand>) -> SessionEnd {
        let (client, mut event_loop) = self.new_session();
        *lock_ignore_poison(&self.client) = Some(client);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(LinkCommand::Connect) => {
                        self.session_up.store(false, Ordering::Relaxed);
                        return SessionEnd::Rebuild;
                    }
                    Some(LinkCommand::Shutdown) | None => {
                        self.session_up.store(false, Ordering::Relaxed);
                        drain_disconnect(&mut event_loop).await;
                        return SessionEnd::Shutdown;
                    }
                },
                event = event_loop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code == ConnectReturnCode::Success {
                            self.session_up.store(true, Ordering::Relaxed);
                            (self.on_event)(TransportEvent::Connected);
                        } else {
                            self.session_up.store(false, Ordering::Relaxed);
                            (self.on_event)(TransportEvent::ConnectFailed(format!(
                                "broker refused connection: {:?}",
                                ack.code
                            )));
                            return SessionEnd::Dropped;
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect(_))) => {
                        self.session_up.store(false, Ordering::Relaxed);
                        (self.on_event)(TransportEvent::ConnectionLost(
                            "broker sent disconnect".to_string(),
                        ));
                        return SessionEnd::Dropped;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        let was_up = self.session_up.swap(false, Ordering::Relaxed);
                        if was_up {
                            (self.on_event)(TransportEvent::ConnectionLost(err.to_string()));
                        } else {
                            (self.on_event)(TransportEvent::ConnectFailed(err.to_string()));
                        }
                        return SessionEnd::Dropped;
                    }
                }
            }
        }
    }

    fn new_session(&self) -> (AsyncClient, EventLoop) {
        let mut options = MqttOptions::new(
            self.client_id.clone(),
            self.endpoint.host.clone(),
            self.endpoint.port,
        );
        options.set_keep_alive(self.keepalive);
        options.set_clean_start(true);
        if self.endpoint.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        if let Some(will) = &self.will {
            options.set_last_will(MqttLastWill::new(
                will.topic.clone(),
                will.payload.to_vec(),
                map_qos(will.qos),
                will.retain,
                None,
            ));
        }
        AsyncClient::new(options, REQUEST_QUEUE_CAP)
    }
}

/// Poll until the outgoing DISCONNECT leaves, bounded so shutdown can't hang.
async fn drain_disconnect(event_loop: &mut EventLoop) {
    let drain = async {
        loop {
            match event_loop.poll().await {
                Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };
    let _ = tokio::time::timeout(Duration::from_millis(500), drain).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint_defaults() {
        let endpoint = BrokerEndpoint::parse("mqtt://localhost").unwrap();
        assert_eq!(
            endpoint,
            BrokerEndpoint {
                host: "localhost".to_string(),
                port: 1883,
                tls: false,
            }
        );

        let endpoint = BrokerEndpoint::parse("mqtts://broker.example.com").unwrap();
        assert_eq!(endpoint.port, 8883);
        assert!(endpoint.tls);
    }

    #[test]
    fn test_parse_endpoint_explicit_port() {
        let endpoint = BrokerEndpoint::parse("mqtt://10.0.0.5:11883").unwrap();
        assert_eq!(endpoint.host, "10.0.0.5");
        assert_eq!(endpoint.port, 11883);
    }

    #[test]
    fn test_parse_endpoint_rejects_other_schemes() {
        assert!(matches!(
            BrokerEndpoint::parse("http://localhost:1883"),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            BrokerEndpoint::parse("not a url"),
            Err(TransportError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_open_validates_identity() {
        let endpoint = BrokerEndpoint::parse("mqtt://localhost:1883").unwrap();
        assert!(BrokerLink::open(endpoint.clone(), "pi-sim-01").is_ok());
        assert!(BrokerLink::open(endpoint.clone(), "dev.node_3").is_ok());

        assert!(matches!(
            BrokerLink::open(endpoint.clone(), ""),
            Err(TransportError::InvalidIdentity(_))
        ));
        assert!(matches!(
            BrokerLink::open(endpoint, "bad id!"),
            Err(TransportError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_publish_before_start_has_no_session() {
        let endpoint = BrokerEndpoint::parse("mqtt://localhost:1883").unwrap();
        let link = BrokerLink::open(endpoint, "pi-sim-01").unwrap();

        let request = PublishRequest {
            topic: "devices/pi-sim-01/temperature".to_string(),
            payload: bytes::Bytes::from_static(b"{}"),
            qos: Qos::AtMostOnce,
            retain: false,
        };
        assert!(matches!(
            link.publish(&request),
            Err(PublishError::NoSession)
        ));
    }

    #[test]
    fn test_reconnect_before_start_is_not_running() {
        let endpoint = BrokerEndpoint::parse("mqtt://localhost:1883").unwrap();
        let link = BrokerLink::open(endpoint, "pi-sim-01").unwrap();
        assert!(matches!(
            link.request_reconnect(),
            Err(TransportError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_start_twice_fails_and_shutdown_is_clean() {
        let endpoint = BrokerEndpoint::parse("mqtt://127.0.0.1:1").unwrap();
        let link = BrokerLink::open(endpoint, "pi-sim-01").unwrap();

        link.start(Duration::from_secs(5), Box::new(|_| {})).unwrap();
        assert!(matches!(
            link.start(Duration::from_secs(5), Box::new(|_| {})),
            Err(TransportError::AlreadyStarted)
        ));

        link.shutdown().await;
        // After shutdown the worker is gone and requests are refused.
        assert!(matches!(
            link.request_reconnect(),
            Err(TransportError::NotRunning)
        ));
    }
}
