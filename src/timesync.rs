//! Time synchronization gate
//!
//! The time source has no completion callback, so a campaign polls it until the
//! wall clock reports a plausible calendar year, then sets the time flag.
//! Campaigns are triggered by link-up transitions published by the link
//! supervisor.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::TimeConfig;
use crate::drivers::TimeSource;
use crate::readiness::{ReadinessFlag, ReadinessSet};
use crate::{Result, UplinkError};

/// Polls a [`TimeSource`] until it is synchronized
pub struct TimeSyncService<T: TimeSource> {
    source: Arc<T>,
    readiness: ReadinessSet,
    server: String,
    poll_interval: Duration,
    min_year: i32,
    timeout: Option<Duration>,
    resync_on_reconnect: bool,
}

impl<T: TimeSource> TimeSyncService<T> {
    /// Create a service from its config section
    pub fn new(source: Arc<T>, readiness: ReadinessSet, config: &TimeConfig) -> Self {
        Self {
            source,
            readiness,
            server: config.server.clone(),
            poll_interval: config.poll_interval,
            min_year: config.min_year,
            timeout: config.timeout,
            resync_on_reconnect: config.resync_on_reconnect,
        }
    }

    /// Whether `instant` falls in or after the sanity floor year
    pub fn is_plausible(&self, instant: DateTime<Utc>) -> bool {
        instant.year() >= self.min_year
    }

    /// Run one synchronization campaign.
    ///
    /// Without a configured timeout this waits as long as it takes and only
    /// returns early on cancellation.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<DateTime<Utc>> {
        info!("Initializing time sync via {} (floor year {})", self.server, self.min_year);

        let bounded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, self.campaign())
                    .await
                    .unwrap_or(Err(UplinkError::TimeSyncTimeout { duration: limit })),
                None => self.campaign().await,
            }
        };

        let synced = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UplinkError::Cancelled { operation: "time sync" }),
            synced = bounded => synced?,
        };

        info!("Time synchronized: {}", synced.to_rfc3339());
        self.readiness.set(ReadinessFlag::Time);
        Ok(synced)
    }

    async fn campaign(&self) -> Result<DateTime<Utc>> {
        self.source.start().await?;
        loop {
            let now: DateTime<Utc> = self.source.now().into();
            if self.is_plausible(now) {
                return Ok(now);
            }
            debug!("Waiting for time sync (clock reads {})", now.year());
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Spawn a task that runs a campaign on link-up.
    ///
    /// Once synced, later link-ups are ignored unless `resync_on_reconnect` is
    /// set. A campaign that timed out is retried on the next link-up either way.
    pub fn spawn(
        self,
        mut link_up: watch::Receiver<u64>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut synced = false;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = link_up.changed() => {
                        if changed.is_err() {
                            debug!("Link supervisor gone, stopping time sync");
                            break;
                        }
                    }
                }
                let generation = *link_up.borrow_and_update();

                if synced && !self.resync_on_reconnect {
                    debug!("Link up #{}, time already synced", generation);
                    continue;
                }

                match self.run(&cancel).await {
                    Ok(_) => synced = true,
                    Err(UplinkError::Cancelled { .. }) => break,
                    Err(e @ UplinkError::TimeSyncTimeout { .. }) => {
                        error!("{}; waiting for next link-up", e);
                    }
                    Err(e) => warn!("Time sync failed: {}", e),
                }
            }

            info!("Time sync service stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    use tokio::time::Instant;

    /// Reads 1970 until `synced_after` has elapsed, then 2023.
    struct LateClock {
        boot: Instant,
        synced_after: Option<Duration>,
        starts: AtomicU32,
    }

    impl LateClock {
        fn new(synced_after: Option<Duration>) -> Arc<Self> {
            Arc::new(Self { boot: Instant::now(), synced_after, starts: AtomicU32::new(0) })
        }
    }

    #[async_trait::async_trait]
    impl TimeSource for LateClock {
        async fn start(&self) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn now(&self) -> SystemTime {
            let elapsed = self.boot.elapsed();
            match self.synced_after {
                Some(after) if elapsed >= after => {
                    UNIX_EPOCH + Duration::from_secs(1_700_000_000) + elapsed
                }
                _ => UNIX_EPOCH + elapsed,
            }
        }
    }

    fn config(timeout: Option<Duration>, resync: bool) -> TimeConfig {
        TimeConfig { timeout, resync_on_reconnect: resync, ..TimeConfig::default() }
    }

    #[tokio::test(start_paused = true)]
    async fn campaign_sets_time_flag_once_year_is_plausible() {
        let readiness = ReadinessSet::new();
        let clock = LateClock::new(Some(Duration::from_millis(1200)));
        let service = TimeSyncService::new(clock, readiness.clone(), &config(None, false));

        let started = Instant::now();
        let synced = service.run(&CancellationToken::new()).await.unwrap();

        assert!(synced.year() >= 2016);
        assert!(readiness.is_set(ReadinessFlag::Time));
        // polled at 0, 500, 1000, 1500
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn already_synced_clock_passes_without_polling() {
        let readiness = ReadinessSet::new();
        let service = TimeSyncService::new(
            Arc::new(crate::drivers::SystemClock),
            readiness.clone(),
            &config(None, false),
        );

        let started = Instant::now();
        service.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(readiness.is_set(ReadinessFlag::Time));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_campaign_reports_timeout() {
        let readiness = ReadinessSet::new();
        let service = TimeSyncService::new(
            LateClock::new(None),
            readiness.clone(),
            &config(Some(Duration::from_secs(5)), false),
        );

        let result = service.run(&CancellationToken::new()).await;

        match result {
            Err(UplinkError::TimeSyncTimeout { duration }) => {
                assert_eq!(duration, Duration::from_secs(5))
            }
            other => panic!("expected TimeSyncTimeout, got {other:?}"),
        }
        assert!(!readiness.is_set(ReadinessFlag::Time));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_campaign_blocks_until_cancelled() {
        let readiness = ReadinessSet::new();
        let service =
            TimeSyncService::new(LateClock::new(None), readiness.clone(), &config(None, false));
        let cancel = CancellationToken::new();

        let still_waiting =
            tokio::time::timeout(Duration::from_secs(3600), service.run(&cancel)).await;
        assert!(still_waiting.is_err(), "unbounded campaign must not give up on its own");

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            trigger.cancel();
        });
        let result = service.run(&cancel).await;
        assert!(matches!(result, Err(UplinkError::Cancelled { .. })));
        assert!(!readiness.is_set(ReadinessFlag::Time));
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_service_syncs_once_without_resync() {
        let readiness = ReadinessSet::new();
        let clock = LateClock::new(Some(Duration::ZERO));
        let service =
            TimeSyncService::new(Arc::clone(&clock), readiness.clone(), &config(None, false));
        let (link_up, link_up_rx) = watch::channel(0u64);
        let cancel = CancellationToken::new();

        let task = service.spawn(link_up_rx, cancel.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!readiness.is_set(ReadinessFlag::Time), "no campaign before link-up");

        for _ in 0..3 {
            link_up.send_modify(|g| *g += 1);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(readiness.is_set(ReadinessFlag::Time));
        assert_eq!(clock.starts.load(Ordering::SeqCst), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_service_resyncs_on_every_link_up_when_enabled() {
        let readiness = ReadinessSet::new();
        let clock = LateClock::new(Some(Duration::ZERO));
        let service =
            TimeSyncService::new(Arc::clone(&clock), readiness.clone(), &config(None, true));
        let (link_up, link_up_rx) = watch::channel(0u64);
        let cancel = CancellationToken::new();

        let task = service.spawn(link_up_rx, cancel.clone());

        for _ in 0..3 {
            link_up.send_modify(|g| *g += 1);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(clock.starts.load(Ordering::SeqCst), 3);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_campaign_retries_on_next_link_up() {
        let readiness = ReadinessSet::new();
        let clock = LateClock::new(Some(Duration::from_secs(8)));
        let service = TimeSyncService::new(
            Arc::clone(&clock),
            readiness.clone(),
            &config(Some(Duration::from_secs(5)), false),
        );
        let (link_up, link_up_rx) = watch::channel(0u64);
        let cancel = CancellationToken::new();

        let task = service.spawn(link_up_rx, cancel.clone());

        link_up.send_modify(|g| *g += 1);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!readiness.is_set(ReadinessFlag::Time));

        link_up.send_modify(|g| *g += 1);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(readiness.is_set(ReadinessFlag::Time));
        assert_eq!(clock.starts.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    /// Time source whose start request never returns
    struct StuckStart;

    #[async_trait::async_trait]
    impl TimeSource for StuckStart {
        async fn start(&self) -> Result<()> {
            std::future::pending().await
        }

        fn now(&self) -> SystemTime {
            UNIX_EPOCH
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_a_start_that_never_returns() {
        let readiness = ReadinessSet::new();
        let service =
            TimeSyncService::new(Arc::new(StuckStart), readiness.clone(), &config(None, false));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(60), service.run(&cancel))
            .await
            .expect("campaign should end on cancel");
        assert!(matches!(result, Err(UplinkError::Cancelled { .. })));
        assert!(!readiness.is_set(ReadinessFlag::Time));
    }
}
