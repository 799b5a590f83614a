//! Telemetry producer
//!
//! Waits until link, time and session are all ready, then publishes one
//! [`TelemetryRecord`] per interval, forever. The readiness gate is checked
//! once; after it opens the loop keeps publishing through later flaps and
//! relies on publish results instead.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ProducerConfig;
use crate::drivers::{SessionClient, TimeSource};
use crate::link::sleep_or_cancel;
use crate::readiness::{ReadinessFlag, ReadinessSet, WaitOutcome};
use crate::types::{QoS, TelemetryRecord};
use crate::{Result, UplinkError};

/// Publishes sequenced, timestamped records over a session
pub struct ProducerLoop<C: SessionClient, T: TimeSource> {
    session: Arc<C>,
    clock: Arc<T>,
    readiness: ReadinessSet,
    topic: String,
    qos: QoS,
    retain: bool,
    interval: Duration,
    sequence: u32,
    last: watch::Sender<Option<TelemetryRecord>>,
}

impl<C: SessionClient, T: TimeSource> ProducerLoop<C, T> {
    /// Create a producer; the first record will carry sequence 0
    pub fn new(
        session: Arc<C>,
        clock: Arc<T>,
        readiness: ReadinessSet,
        config: &ProducerConfig,
    ) -> Self {
        let (last, _) = watch::channel(None);
        Self {
            session,
            clock,
            readiness,
            topic: config.topic.clone(),
            qos: config.qos,
            retain: config.retain,
            interval: config.interval,
            sequence: 0,
            last,
        }
    }

    /// Sequence number the next record will carry
    pub fn next_sequence(&self) -> u32 {
        self.sequence
    }

    /// Receiver holding the most recently published record
    pub fn subscribe(&self) -> watch::Receiver<Option<TelemetryRecord>> {
        self.last.subscribe()
    }

    /// Stream of the latest published record.
    ///
    /// Backed by a `watch` channel: a consumer that falls behind sees only the
    /// newest record, and the skipped ones are not replayed.
    pub fn records(&self) -> impl Stream<Item = TelemetryRecord> + 'static {
        WatchStream::from_changes(self.last.subscribe()).filter_map(|opt| async move { opt })
    }

    /// Block until link, time and session are all ready.
    pub async fn wait_until_ready(&self, cancel: &CancellationToken) -> Result<()> {
        match self.readiness.wait_all_until(&ReadinessFlag::ALL, None, cancel).await {
            WaitOutcome::Ready => Ok(()),
            WaitOutcome::Cancelled | WaitOutcome::TimedOut => {
                Err(UplinkError::Cancelled { operation: "waiting for readiness" })
            }
        }
    }

    /// Build and publish one record.
    ///
    /// The sequence only advances when the session accepts the record, so the
    /// published stream has no gaps. It wraps at `u32::MAX`.
    pub async fn publish_next(&mut self) -> Result<TelemetryRecord> {
        let record = TelemetryRecord::stamped(self.sequence, self.clock.now());
        let payload = record.to_payload();

        self.session
            .publish(&self.topic, &payload, self.qos, self.retain)
            .await
            .map_err(|e| UplinkError::publish_failed(self.topic.as_str(), record.sequence, e))?;

        info!("Publish: {}", record);
        self.sequence = self.sequence.wrapping_add(1);
        self.last.send_replace(Some(record));
        Ok(record)
    }

    /// Wait for readiness, then publish every interval until cancelled.
    ///
    /// Publish failures are logged and skipped; the next cycle tries again. A
    /// publish still in flight when `cancel` fires is abandoned.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        self.wait_until_ready(&cancel).await?;
        info!("Publisher started on '{}' every {:?}", self.topic, self.interval);

        while !cancel.is_cancelled() {
            let published = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("In-flight publish abandoned on cancel");
                    break;
                }
                published = self.publish_next() => published,
            };
            if let Err(e) = published {
                warn!("{}; skipping this cycle", e);
            }
            if !sleep_or_cancel(self.interval, &cancel).await {
                break;
            }
        }

        info!("Publisher stopped after {} records", self.sequence);
        Ok(())
    }
}
