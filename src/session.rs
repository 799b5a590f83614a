//! Session supervisor
//!
//! Starts the messaging client at boot, independently of link and time, and
//! mirrors its lifecycle events into the session readiness flag. The client
//! library reconnects on its own once started, so the supervisor only retries
//! `connect` calls that were refused outright.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::drivers::SessionClient;
use crate::link::sleep_or_cancel;
use crate::readiness::{ReadinessFlag, ReadinessSet};
use crate::retry::BackoffPolicy;
use crate::types::{SessionEvent, SessionState};

/// Observation handle for a spawned [`SessionSupervisor`]
pub struct SessionHandle {
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver for session state transitions
    pub fn state_updates(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait for the supervisor task to finish
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("Session supervisor task failed: {}", e);
        }
    }

    pub(crate) fn into_parts(self) -> (watch::Receiver<SessionState>, JoinHandle<()>) {
        (self.state, self.task)
    }
}

/// Owns the messaging session lifecycle
pub struct SessionSupervisor<C: SessionClient> {
    client: Arc<C>,
    events: mpsc::Receiver<SessionEvent>,
    readiness: ReadinessSet,
    uri: String,
    clear_on_disconnect: bool,
    retry: BackoffPolicy,
    state: watch::Sender<SessionState>,
}

impl<C: SessionClient> SessionSupervisor<C> {
    /// Spawn the supervisor task.
    ///
    /// The task stops when `cancel` fires or the client drops its event sender.
    pub fn spawn(
        client: Arc<C>,
        events: mpsc::Receiver<SessionEvent>,
        readiness: ReadinessSet,
        config: &SessionConfig,
        cancel: CancellationToken,
    ) -> SessionHandle {
        let (state, state_rx) = watch::channel(SessionState::Disconnected);

        let supervisor = Self {
            client,
            events,
            readiness,
            uri: config.uri.clone(),
            clear_on_disconnect: config.clear_on_disconnect,
            retry: config.retry,
            state,
        };
        let task = tokio::spawn(supervisor.run(cancel));

        SessionHandle { state: state_rx, task }
    }

    async fn run(mut self, cancel: CancellationToken) {
        info!("Starting session with {}", self.uri);

        let mut refused = 0u32;
        while let Err(e) = self.client.connect().await {
            let delay = self.retry.delay(refused);
            refused = refused.saturating_add(1);
            warn!("Session connect refused (attempt {}), retrying in {:?}: {}", refused, delay, e);
            if !sleep_or_cancel(delay, &cancel).await {
                info!("Session supervisor cancelled during connect");
                return;
            }
        }

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Session supervisor cancelled");
                    break;
                }
                event = self.events.recv() => event,
            };

            match event {
                Some(event) => self.handle(event),
                None => {
                    info!("Session event channel closed, stopping supervisor");
                    break;
                }
            }
        }
    }

    fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected => {
                info!("Session connected");
                self.transition(SessionState::Connected);
                self.readiness.set(ReadinessFlag::Session);
            }
            SessionEvent::Disconnected { reason } => {
                self.transition(SessionState::Disconnected);
                if self.clear_on_disconnect {
                    info!("Session disconnected ({})", reason);
                    self.readiness.clear(ReadinessFlag::Session);
                } else {
                    warn!("Session disconnected ({}), session flag retained", reason);
                }
            }
        }
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Session state {} -> {}", previous, next);
        }
    }
}
