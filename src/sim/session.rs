//! Simulated broker session

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::drivers::{SessionClient, SessionEventSender};
use crate::types::{QoS, SessionEvent};
use crate::{Result, UplinkError};

/// One message accepted by a [`SimSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
    pub at: Instant,
}

/// Session client that handshakes after a fixed delay and records publishes.
///
/// Publishing while disconnected fails, like a real client with no
/// outgoing queue.
pub struct SimSession {
    events: SessionEventSender,
    handshake_delay: Duration,
    connected: Arc<AtomicBool>,
    failing: AtomicBool,
    connects: AtomicU32,
    published: Mutex<Vec<Published>>,
}

impl SimSession {
    /// Create a session that reports on `events`
    pub fn new(events: SessionEventSender, handshake_delay: Duration) -> Self {
        Self {
            events,
            handshake_delay,
            connected: Arc::new(AtomicBool::new(false)),
            failing: AtomicBool::new(false),
            connects: AtomicU32::new(0),
            published: Mutex::new(Vec::new()),
        }
    }

    /// Messages accepted so far
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    /// Number of `connect` calls
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Make every publish fail while set, even when connected
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Simulate the broker dropping the session
    pub async fn drop_session(&self, reason: impl Into<String>) {
        self.connected.store(false, Ordering::SeqCst);
        self.emit(SessionEvent::Disconnected { reason: reason.into() }).await;
    }

    /// Simulate the client's own reconnect completing
    pub async fn restore(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.emit(SessionEvent::Connected).await;
    }

    async fn emit(&self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            warn!("Session supervisor gone, dropping simulated event");
        }
    }
}

#[async_trait::async_trait]
impl SessionClient for SimSession {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!("Simulated session handshake in {:?}", self.handshake_delay);

        // The real client completes the handshake in the background; so does this one.
        let events = self.events.clone();
        let connected = Arc::clone(&self.connected);
        let delay = self.handshake_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            connected.store(true, Ordering::SeqCst);
            if events.send(SessionEvent::Connected).await.is_err() {
                debug!("Session supervisor gone, dropping handshake");
            }
        });
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(UplinkError::session_failed("session not connected"));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(UplinkError::session_failed("broker rejected publish"));
        }

        let payload = String::from_utf8_lossy(payload).into_owned();
        self.published.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(Published {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
            at: Instant::now(),
        });
        Ok(())
    }
}
