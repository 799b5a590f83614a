//! Simulated collaborators for tests and the `uplink-sim` binary
//!
//! These stand in for the radio, the NTP client and the broker connection.
//! They use `tokio::time`, so they behave deterministically under a paused
//! test clock.

mod clock;
mod link;
mod session;

pub use clock::SimClock;
pub use link::{ConnectOutcome, SimLink, SimLinkControl};
pub use session::{Published, SimSession};
