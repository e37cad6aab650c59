//! Mock transport for testing
//!
//! Records every publish, counts reconnect requests, and lets a test flip
//! the session state or fire connection events by hand. Clones share state,
//! so a test can keep a handle after moving the mock into a client.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::transport::{
    EventHook, LastWill, PublishError, PublishRequest, Transport, TransportError, TransportEvent,
};

#[derive(Default)]
struct MockState {
    published: Mutex<Vec<PublishRequest>>,
    last_will: Mutex<Option<LastWill>>,
    hook: Mutex<Option<EventHook>>,
    reconnect_requests: AtomicU64,
    shutdown_calls: AtomicU64,
    session_up: AtomicBool,
    started: AtomicBool,
    fail_next_publish: AtomicBool,
    refuse_reconnect: AtomicBool,
    refuse_start: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose session is already up, for tests that publish directly.
    pub fn with_session() -> Self {
        let mock = Self::new();
        mock.set_session(true);
        mock
    }

    /// Flip the transport-side session flag without firing an event, as if
    /// the broker connection evaporated under the client.
    pub fn set_session(&self, up: bool) {
        self.state.session_up.store(up, Ordering::Relaxed);
    }

    /// Make the next publish fail with a transport rejection.
    pub fn fail_next_publish(&self) {
        self.state.fail_next_publish.store(true, Ordering::Relaxed);
    }

    /// Make reconnect requests fail to queue.
    pub fn refuse_reconnects(&self, refuse: bool) {
        self.state.refuse_reconnect.store(refuse, Ordering::Relaxed);
    }

    /// Make `start` fail, simulating a transport that cannot initialize.
    pub fn refuse_start(&self) {
        self.state.refuse_start.store(true, Ordering::Relaxed);
    }

    /// Invoke the registered event hook, standing in for the worker thread.
    pub fn fire(&self, event: TransportEvent) {
        if let Some(hook) = lock(&self.state.hook).as_ref() {
            hook(event);
        }
    }

    pub fn started(&self) -> bool {
        self.state.started.load(Ordering::Relaxed)
    }

    pub fn will(&self) -> Option<LastWill> {
        lock(&self.state.last_will).clone()
    }

    pub fn reconnect_requests(&self) -> u64 {
        self.state.reconnect_requests.load(Ordering::Relaxed)
    }

    pub fn shutdown_calls(&self) -> u64 {
        self.state.shutdown_calls.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> Vec<PublishRequest> {
        lock(&self.state.published).clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<PublishRequest> {
        self.published()
            .into_iter()
            .filter(|request| request.topic == topic)
            .collect()
    }

    pub fn clear_published(&self) {
        lock(&self.state.published).clear();
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    fn set_last_will(&self, will: LastWill) {
        *lock(&self.state.last_will) = Some(will);
    }

    fn start(&self, _keepalive: Duration, on_event: EventHook) -> Result<(), TransportError> {
        if self.state.refuse_start.load(Ordering::Relaxed) {
            return Err(TransportError::QueueClosed {
                operation: "connect",
            });
        }
        if self.state.started.swap(true, Ordering::Relaxed) {
            return Err(TransportError::AlreadyStarted);
        }
        *lock(&self.state.hook) = Some(on_event);
        Ok(())
    }

    fn request_reconnect(&self) -> Result<(), TransportError> {
        if self.state.refuse_reconnect.load(Ordering::Relaxed) {
            return Err(TransportError::QueueClosed {
                operation: "reconnect",
            });
        }
        self.state.reconnect_requests.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn publish(&self, request: &PublishRequest) -> Result<(), PublishError> {
        if !self.state.session_up.load(Ordering::Relaxed) {
            return Err(PublishError::NoSession);
        }
        if self.state.fail_next_publish.swap(false, Ordering::Relaxed) {
            return Err(PublishError::Rejected("forced failure".to_string()));
        }
        lock(&self.state.published).push(request.clone());
        Ok(())
    }

    async fn shutdown(&self) {
        self.state.shutdown_calls.fetch_add(1, Ordering::Relaxed);
        self.state.session_up.store(false, Ordering::Relaxed);
        self.state.started.store(false, Ordering::Relaxed);
    }
}
