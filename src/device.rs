//! Device bring-up
//!
//! Wires the supervisors, the time sync service and the producer together
//! around one [`ReadinessSet`] and runs each as its own task:
//!
//! ```text
//! LinkSupervisor --link flag--------------------+
//!        | link-up                              |
//!        v                                      v
//! TimeSyncService --time flag--> ReadinessSet --> ProducerLoop --> SessionClient
//!                                      ^
//! SessionSupervisor --session flag-----+
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::drivers::{LinkDriver, SessionClient, TimeSource};
use crate::link::LinkSupervisor;
use crate::producer::ProducerLoop;
use crate::readiness::{ReadinessFlag, ReadinessSet, WaitOutcome};
use crate::session::SessionSupervisor;
use crate::timesync::TimeSyncService;
use crate::types::{LinkEvent, LinkState, SessionEvent, SessionState, TelemetryRecord};
use crate::{Result, UplinkError};

/// Concrete collaborators and the receiving ends of their event channels
pub struct DeviceParts<L, T, S> {
    pub link: L,
    pub link_events: mpsc::Receiver<LinkEvent>,
    pub clock: Arc<T>,
    pub session: Arc<S>,
    pub session_events: mpsc::Receiver<SessionEvent>,
}

/// A running device. Dropping it cancels every task.
pub struct Device {
    readiness: ReadinessSet,
    link_state: watch::Receiver<LinkState>,
    session_state: watch::Receiver<SessionState>,
    records: watch::Receiver<Option<TelemetryRecord>>,
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Device {
    /// Validate `config` and start every subsystem.
    ///
    /// Returns as soon as the tasks are spawned; use [`wait_ready`](Self::wait_ready)
    /// to wait for bring-up.
    pub fn boot<L, T, S>(config: &DeviceConfig, parts: DeviceParts<L, T, S>) -> Result<Self>
    where
        L: LinkDriver,
        T: TimeSource,
        S: SessionClient,
    {
        config.validate()?;
        info!(
            "Booting device: ssid '{}', broker {}, topic '{}'",
            config.link.ssid, config.session.uri, config.producer.topic
        );

        let readiness = ReadinessSet::new();
        let cancel = CancellationToken::new();

        let link = LinkSupervisor::spawn(
            parts.link,
            parts.link_events,
            readiness.clone(),
            config.link.retry,
            cancel.clone(),
        );
        let (link_state, link_up, link_task) = link.into_parts();

        let time_sync =
            TimeSyncService::new(Arc::clone(&parts.clock), readiness.clone(), &config.time);
        let time_task = time_sync.spawn(link_up, cancel.clone());

        let session = SessionSupervisor::spawn(
            Arc::clone(&parts.session),
            parts.session_events,
            readiness.clone(),
            &config.session,
            cancel.clone(),
        );
        let (session_state, session_task) = session.into_parts();

        let producer =
            ProducerLoop::new(parts.session, parts.clock, readiness.clone(), &config.producer);
        let records = producer.subscribe();
        let producer_cancel = cancel.clone();
        let producer_task = tokio::spawn(async move {
            if let Err(e) = producer.run(producer_cancel).await {
                debug!("Producer ended: {}", e);
            }
        });

        Ok(Self {
            readiness,
            link_state,
            session_state,
            records,
            cancel,
            tasks: vec![
                ("link", link_task),
                ("time", time_task),
                ("session", session_task),
                ("producer", producer_task),
            ],
        })
    }

    /// Shared readiness flags
    pub fn readiness(&self) -> &ReadinessSet {
        &self.readiness
    }

    /// Current link state
    pub fn link_state(&self) -> LinkState {
        *self.link_state.borrow()
    }

    /// Current session state
    pub fn session_state(&self) -> SessionState {
        *self.session_state.borrow()
    }

    /// Most recently published record, if any
    pub fn last_record(&self) -> Option<TelemetryRecord> {
        *self.records.borrow()
    }

    /// Stream of the latest published record; a slow consumer skips
    /// intermediate records
    pub fn records(&self) -> impl Stream<Item = TelemetryRecord> + 'static {
        WatchStream::from_changes(self.records.clone()).filter_map(|opt| async move { opt })
    }

    /// Wait until link, time and session are all ready
    pub async fn wait_ready(&self, timeout: Option<Duration>) -> WaitOutcome {
        self.readiness.wait_all_until(&ReadinessFlag::ALL, timeout, &self.cancel).await
    }

    /// Token that stops every device task when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every task and wait for them to finish
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down device");
        self.cancel.cancel();

        let mut first_failure = None;
        for (name, task) in std::mem::take(&mut self.tasks) {
            if let Err(source) = task.await {
                warn!("{} task failed: {}", name, source);
                first_failure.get_or_insert(UplinkError::Task { task: name, source });
            }
        }

        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        debug!("Dropping device");
        self.cancel.cancel();
    }
}
