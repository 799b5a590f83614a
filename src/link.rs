//! Link supervisor
//!
//! Owns the [`LinkDriver`] and reacts to its lifecycle events:
//!
//! ```text
//! Idle --start--> Connecting --AddressAcquired--> Connected
//!                     ^                               |
//!                     +--(retry delay)-- Disconnected <+ Disconnected event
//! ```
//!
//! Every `Disconnected` event clears the link flag and schedules exactly one
//! new connect attempt after the configured [`BackoffPolicy`] delay. Each
//! `AddressAcquired` sets the flag and bumps the link-up generation that the
//! time sync service listens on.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::drivers::LinkDriver;
use crate::readiness::{ReadinessFlag, ReadinessSet};
use crate::retry::BackoffPolicy;
use crate::types::{LinkEvent, LinkState};

/// Observation handle for a spawned [`LinkSupervisor`]
pub struct LinkHandle {
    state: watch::Receiver<LinkState>,
    link_up: watch::Receiver<u64>,
    task: JoinHandle<()>,
}

impl LinkHandle {
    /// Current link state
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Receiver for link state transitions
    pub fn state_updates(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    /// Receiver whose value counts completed link-ups. It starts unseen at 0
    /// and changes once per `AddressAcquired`.
    pub fn link_up(&self) -> watch::Receiver<u64> {
        self.link_up.clone()
    }

    /// Wait for the supervisor task to finish
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("Link supervisor task failed: {}", e);
        }
    }

    pub(crate) fn into_parts(
        self,
    ) -> (watch::Receiver<LinkState>, watch::Receiver<u64>, JoinHandle<()>) {
        (self.state, self.link_up, self.task)
    }
}

/// Drives link bring-up and reconnection
pub struct LinkSupervisor<D: LinkDriver> {
    driver: D,
    events: mpsc::Receiver<LinkEvent>,
    readiness: ReadinessSet,
    retry: BackoffPolicy,
    state: watch::Sender<LinkState>,
    link_up: watch::Sender<u64>,
    attempt: u32,
}

impl<D: LinkDriver> LinkSupervisor<D> {
    /// Spawn the supervisor task.
    ///
    /// The task stops when `cancel` fires or the driver drops its event sender.
    pub fn spawn(
        driver: D,
        events: mpsc::Receiver<LinkEvent>,
        readiness: ReadinessSet,
        retry: BackoffPolicy,
        cancel: CancellationToken,
    ) -> LinkHandle {
        let (state, state_rx) = watch::channel(LinkState::Idle);
        let (link_up, link_up_rx) = watch::channel(0u64);

        let supervisor =
            Self { driver, events, readiness, retry, state, link_up, attempt: 0 };
        let task = tokio::spawn(supervisor.run(cancel));

        LinkHandle { state: state_rx, link_up: link_up_rx, task }
    }

    async fn run(mut self, cancel: CancellationToken) {
        info!("Link supervisor started");

        if !self.start_driver(&cancel).await {
            info!("Link supervisor cancelled during start");
            return;
        }

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Link supervisor cancelled");
                    break;
                }
                event = self.events.recv() => event,
            };

            let Some(event) = event else {
                info!("Link event channel closed, stopping supervisor");
                break;
            };

            if !self.handle(event, &cancel).await {
                info!("Link supervisor cancelled during retry");
                break;
            }
        }

        self.readiness.clear(ReadinessFlag::Link);
    }

    /// Returns `false` if cancelled before the driver accepted the start.
    async fn start_driver(&mut self, cancel: &CancellationToken) -> bool {
        let mut attempt = 0u32;
        loop {
            match self.driver.start().await {
                Ok(()) => {
                    self.transition(LinkState::Connecting);
                    return true;
                }
                Err(e) => {
                    let delay = self.retry.delay(attempt);
                    attempt = attempt.saturating_add(1);
                    warn!(
                        "Link start failed (attempt {}), retrying in {:?}: {}",
                        attempt, delay, e
                    );
                    if !sleep_or_cancel(delay, cancel).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Returns `false` if cancelled mid-handling.
    async fn handle(&mut self, event: LinkEvent, cancel: &CancellationToken) -> bool {
        match event {
            LinkEvent::Started => {
                debug!("Link started, issuing connect");
                self.transition(LinkState::Connecting);
                self.connect(cancel).await
            }
            LinkEvent::Disconnected { reason } => {
                self.readiness.clear(ReadinessFlag::Link);
                self.transition(LinkState::Disconnected);

                let delay = self.retry.delay(self.attempt);
                self.attempt = self.attempt.saturating_add(1);
                info!(
                    "Link disconnected ({}), reconnect attempt {} in {:?}",
                    reason, self.attempt, delay
                );

                if !sleep_or_cancel(delay, cancel).await {
                    return false;
                }
                self.transition(LinkState::Connecting);
                self.connect(cancel).await
            }
            LinkEvent::AddressAcquired { address } => {
                info!("Link up, address {}", address);
                self.attempt = 0;
                self.transition(LinkState::Connected);
                self.readiness.set(ReadinessFlag::Link);
                self.link_up.send_modify(|generation| *generation += 1);
                true
            }
        }
    }

    /// Issue one connect attempt. A refused request is retried until the
    /// driver accepts it; the outcome of the association itself arrives as an
    /// event.
    async fn connect(&mut self, cancel: &CancellationToken) -> bool {
        let mut refused = 0u32;
        loop {
            match self.driver.connect().await {
                Ok(()) => return true,
                Err(e) => {
                    let delay = self.retry.delay(refused);
                    refused = refused.saturating_add(1);
                    warn!("Connect request refused, retrying in {:?}: {}", delay, e);
                    if !sleep_or_cancel(delay, cancel).await {
                        return false;
                    }
                }
            }
        }
    }

    fn transition(&self, next: LinkState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Link state {} -> {}", previous, next);
        }
    }
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancellation.
///
/// A zero delay still yields once to the scheduler.
pub(crate) async fn sleep_or_cancel(
    delay: std::time::Duration,
    cancel: &CancellationToken,
) -> bool {
    if delay.is_zero() {
        tokio::task::yield_now().await;
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
