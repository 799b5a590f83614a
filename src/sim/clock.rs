//! Simulated network time client

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;
use tracing::debug;

use crate::Result;
use crate::drivers::TimeSource;

/// Clock that reads near 1970 until `sync_delay` after its first `start`,
/// then reports `wall_at_boot` plus the time since creation.
pub struct SimClock {
    boot: Instant,
    wall_at_boot: SystemTime,
    sync_delay: Duration,
    started: Mutex<Option<Instant>>,
    starts: AtomicU32,
}

impl SimClock {
    /// Create a clock that syncs `sync_delay` after the first campaign starts
    pub fn new(wall_at_boot: SystemTime, sync_delay: Duration) -> Self {
        Self {
            boot: Instant::now(),
            wall_at_boot,
            sync_delay,
            started: Mutex::new(None),
            starts: AtomicU32::new(0),
        }
    }

    /// Clock anchored to the host's current time
    pub fn from_system(sync_delay: Duration) -> Self {
        Self::new(SystemTime::now(), sync_delay)
    }

    /// A clock that never synchronizes
    pub fn never_synced() -> Self {
        Self::new(UNIX_EPOCH, Duration::MAX)
    }

    /// Number of sync campaigns started
    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    fn is_synced(&self) -> bool {
        let started = *self.started.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        started.is_some_and(|at| at.elapsed() >= self.sync_delay)
    }
}

#[async_trait::async_trait]
impl TimeSource for SimClock {
    async fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let mut started = self.started.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if started.is_none() {
            debug!("Simulated time sync started, completes in {:?}", self.sync_delay);
            *started = Some(Instant::now());
        }
        Ok(())
    }

    fn now(&self) -> SystemTime {
        let elapsed = self.boot.elapsed();
        if self.is_synced() {
            self.wall_at_boot + elapsed
        } else {
            UNIX_EPOCH + elapsed
        }
    }
}
