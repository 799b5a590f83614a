//! Readiness-gated telemetry uplink for connected devices.
//!
//! A device has to bring up three independent resources before it may publish
//! anything: a network link, a plausible wall clock and a messaging session.
//! Each is owned by its own supervisor task that reacts to driver events and
//! records the outcome in a shared [`ReadinessSet`]. A [`ProducerLoop`] waits
//! for all three flags, then publishes one `"<sequence>,<epoch-ms>"` record per
//! interval.
//!
//! # Features
//!
//! - **Event-driven supervisors**: link and session lifecycles with bounded backoff
//! - **Time sync gating**: wall clock must reach a plausible year before publishing
//! - **Cancellable waits**: every wait honours a cancellation token
//! - **Simulation**: in-process drivers behind the `sim` feature
//!
//! ## Example (simulated device)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use uplink::sim::{SimClock, SimLink, SimSession};
//! use uplink::{Device, DeviceConfig, DeviceParts, WaitOutcome, link_events, session_events};
//!
//! #[tokio::main]
//! async fn main() -> uplink::Result<()> {
//!     let (link_tx, link_rx) = link_events();
//!     let (session_tx, session_rx) = session_events();
//!     let (link, _control) = SimLink::new(link_tx);
//!
//!     let device = Device::boot(
//!         &DeviceConfig::default(),
//!         DeviceParts {
//!             link,
//!             link_events: link_rx,
//!             clock: Arc::new(SimClock::from_system(Duration::from_millis(500))),
//!             session: Arc::new(SimSession::new(session_tx, Duration::from_millis(100))),
//!             session_events: session_rx,
//!         },
//!     )?;
//!
//!     if device.wait_ready(Some(Duration::from_secs(10))).await == WaitOutcome::Ready {
//!         tokio::time::sleep(Duration::from_secs(5)).await;
//!         println!("last record: {:?}", device.last_record());
//!     }
//!     device.shutdown().await
//! }
//! ```

pub mod config;
pub mod device;
pub mod drivers;
mod error;
pub mod link;
pub mod logging;
pub mod producer;
pub mod readiness;
pub mod retry;
pub mod session;
pub mod timesync;
pub mod types;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

// Core exports
pub use error::*;
pub use readiness::{ReadinessFlag, ReadinessSet, ReadinessSnapshot, WaitOutcome};
pub use retry::{BackoffPolicy, JitterPolicy};
pub use types::{LinkEvent, LinkState, QoS, SessionEvent, SessionState, TelemetryRecord};

// Configuration
pub use config::{
    DeviceConfig, LinkConfig, LogFormat, LoggingConfig, ProducerConfig, SessionConfig, TimeConfig,
};

// Collaborator seams
pub use drivers::{
    LinkDriver, LinkEventSender, SessionClient, SessionEventSender, SystemClock, TimeSource,
    link_events, session_events,
};

// Subsystems
pub use device::{Device, DeviceParts};
pub use link::{LinkHandle, LinkSupervisor};
pub use producer::ProducerLoop;
pub use session::{SessionHandle, SessionSupervisor};
pub use timesync::TimeSyncService;
