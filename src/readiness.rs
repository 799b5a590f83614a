//! Named readiness gates shared between the supervisors and the producer.
//!
//! A [`ReadinessSet`] is a small bitmask of [`ReadinessFlag`]s behind a
//! `tokio::sync::watch` channel. Each supervisor owns exactly one flag and is
//! the only writer for it; the producer only waits. Waiters are woken only
//! when the mask actually changes, so repeated `set` calls are invisible.
//!
//! ```rust
//! use uplink::{ReadinessFlag, ReadinessSet, WaitOutcome};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let readiness = ReadinessSet::new();
//! readiness.set(ReadinessFlag::Link);
//! readiness.set(ReadinessFlag::Time);
//! readiness.set(ReadinessFlag::Session);
//!
//! let outcome = readiness.wait_all(&ReadinessFlag::ALL, Some(Duration::from_secs(1))).await;
//! assert_eq!(outcome, WaitOutcome::Ready);
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// One subsystem's "ready for use" gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadinessFlag {
    /// Link associated and addressed
    Link,

    /// Wall clock synchronized
    Time,

    /// Messaging session established
    Session,
}

impl ReadinessFlag {
    /// Every flag the producer waits on
    pub const ALL: [ReadinessFlag; 3] =
        [ReadinessFlag::Link, ReadinessFlag::Time, ReadinessFlag::Session];

    fn bit(self) -> u8 {
        match self {
            ReadinessFlag::Link => 1 << 0,
            ReadinessFlag::Time => 1 << 1,
            ReadinessFlag::Session => 1 << 2,
        }
    }

    fn mask(flags: &[ReadinessFlag]) -> u8 {
        flags.iter().fold(0, |mask, flag| mask | flag.bit())
    }

    /// Short lowercase name used in logs
    pub fn name(self) -> &'static str {
        match self {
            ReadinessFlag::Link => "link",
            ReadinessFlag::Time => "time",
            ReadinessFlag::Session => "session",
        }
    }
}

impl fmt::Display for ReadinessFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value of a [`ReadinessSet`] at one instant
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadinessSnapshot(u8);

impl ReadinessSnapshot {
    /// Whether `flag` is set
    pub fn is_set(self, flag: ReadinessFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// Whether every flag in `flags` is set. An empty slice is trivially satisfied.
    pub fn contains_all(self, flags: &[ReadinessFlag]) -> bool {
        let mask = ReadinessFlag::mask(flags);
        self.0 & mask == mask
    }

    /// Flags currently set, in declaration order
    pub fn flags(self) -> Vec<ReadinessFlag> {
        ReadinessFlag::ALL.into_iter().filter(|flag| self.is_set(*flag)).collect()
    }
}

impl fmt::Debug for ReadinessSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.flags()).finish()
    }
}

/// Result of waiting on a set of flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every requested flag was set at the same time
    Ready,

    /// The timeout elapsed first
    TimedOut,

    /// The cancellation token fired first
    Cancelled,
}

/// Thread-safe set of readiness flags with blocking wait-for-all.
///
/// Cloning yields another handle to the same set.
#[derive(Clone)]
pub struct ReadinessSet {
    tx: Arc<watch::Sender<ReadinessSnapshot>>,
}

impl Default for ReadinessSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessSet {
    /// Create a set with every flag cleared
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ReadinessSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Set `flag`. Idempotent; waiters are woken only on a real transition.
    pub fn set(&self, flag: ReadinessFlag) {
        let changed = self.tx.send_if_modified(|snapshot| {
            let next = snapshot.0 | flag.bit();
            let changed = next != snapshot.0;
            snapshot.0 = next;
            changed
        });

        if changed {
            debug!(flag = %flag, "Readiness flag set");
        } else {
            trace!(flag = %flag, "Readiness flag already set");
        }
    }

    /// Clear `flag`. Idempotent.
    pub fn clear(&self, flag: ReadinessFlag) {
        let changed = self.tx.send_if_modified(|snapshot| {
            let next = snapshot.0 & !flag.bit();
            let changed = next != snapshot.0;
            snapshot.0 = next;
            changed
        });

        if changed {
            debug!(flag = %flag, "Readiness flag cleared");
        }
    }

    /// Whether `flag` is currently set
    pub fn is_set(&self, flag: ReadinessFlag) -> bool {
        self.snapshot().is_set(flag)
    }

    /// Current value of the whole set
    pub fn snapshot(&self) -> ReadinessSnapshot {
        *self.tx.borrow()
    }

    /// Receiver that observes every transition of the set
    pub fn subscribe(&self) -> watch::Receiver<ReadinessSnapshot> {
        self.tx.subscribe()
    }

    /// Stream of snapshots, starting with the current one
    pub fn updates(&self) -> impl Stream<Item = ReadinessSnapshot> + 'static {
        WatchStream::new(self.tx.subscribe())
    }

    /// Wait until every flag in `flags` is set at once, or `timeout` elapses.
    ///
    /// `None` waits forever.
    pub async fn wait_all(
        &self,
        flags: &[ReadinessFlag],
        timeout: Option<Duration>,
    ) -> WaitOutcome {
        self.wait_all_until(flags, timeout, &CancellationToken::new()).await
    }

    /// Like [`wait_all`](Self::wait_all), but also returns early when `cancel` fires.
    pub async fn wait_all_until(
        &self,
        flags: &[ReadinessFlag],
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        let mask = ReadinessFlag::mask(flags);
        let mut rx = self.tx.subscribe();

        let ready = async move {
            // The sender lives in `self`, so the channel cannot close while we wait.
            let _ = rx.wait_for(|snapshot| snapshot.0 & mask == mask).await;
        };

        let bounded = async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, ready).await {
                    Ok(()) => WaitOutcome::Ready,
                    Err(_) => WaitOutcome::TimedOut,
                },
                None => {
                    ready.await;
                    WaitOutcome::Ready
                }
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
            outcome = bounded => outcome,
        }
    }
}

impl fmt::Debug for ReadinessSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadinessSet").field(&self.snapshot()).finish()
    }
}
