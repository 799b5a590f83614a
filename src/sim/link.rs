//! Simulated wireless link

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::Result;
use crate::drivers::{LinkDriver, LinkEventSender};
use crate::types::LinkEvent;

/// Scripted result of one association attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Associate and acquire an address
    Associate,

    /// Report a disconnect with this reason
    Fail(String),
}

#[derive(Default)]
struct Shared {
    script: Mutex<VecDeque<ConnectOutcome>>,
    attempts: AtomicU32,
}

/// Link driver that answers connect attempts from a script.
///
/// Attempts beyond the end of the script associate.
pub struct SimLink {
    events: LinkEventSender,
    shared: Arc<Shared>,
    address: IpAddr,
    association_delay: Duration,
}

/// Test-side control over a [`SimLink`]
#[derive(Clone)]
pub struct SimLinkControl {
    events: LinkEventSender,
    shared: Arc<Shared>,
}

impl SimLink {
    /// Create a link that reports on `events`, plus its control handle
    pub fn new(events: LinkEventSender) -> (Self, SimLinkControl) {
        let shared = Arc::new(Shared::default());
        let control = SimLinkControl { events: events.clone(), shared: Arc::clone(&shared) };
        let link = Self {
            events,
            shared,
            address: IpAddr::V4(Ipv4Addr::new(192, 168, 4, 2)),
            association_delay: Duration::ZERO,
        };
        (link, control)
    }

    /// Delay between a connect call and its outcome event
    pub fn with_association_delay(mut self, delay: Duration) -> Self {
        self.association_delay = delay;
        self
    }

    fn emit_after(&self, delay: Duration, event: LinkEvent) {
        let events = self.events.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if events.send(event).await.is_err() {
                debug!("Link supervisor gone, dropping simulated event");
            }
        });
    }
}

#[async_trait::async_trait]
impl LinkDriver for SimLink {
    async fn start(&mut self) -> Result<()> {
        debug!("Simulated radio started");
        self.emit_after(Duration::ZERO, LinkEvent::Started);
        Ok(())
    }

    async fn connect(&mut self) -> Result<()> {
        let attempt = self.shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = self
            .shared
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or(ConnectOutcome::Associate);

        debug!("Simulated connect attempt {} -> {:?}", attempt, outcome);
        let event = match outcome {
            ConnectOutcome::Associate => LinkEvent::AddressAcquired { address: self.address },
            ConnectOutcome::Fail(reason) => LinkEvent::Disconnected { reason },
        };
        self.emit_after(self.association_delay, event);
        Ok(())
    }
}

impl SimLinkControl {
    /// Queue outcomes for the next connect attempts
    pub fn script(&self, outcomes: impl IntoIterator<Item = ConnectOutcome>) {
        self.shared
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(outcomes);
    }

    /// Connect attempts made so far
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Simulate losing the association
    pub async fn drop_link(&self, reason: impl Into<String>) {
        let event = LinkEvent::Disconnected { reason: reason.into() };
        if self.events.send(event).await.is_err() {
            warn!("Link supervisor gone, cannot drop link");
        }
    }
}
