//! Collaborator traits for the hardware and protocol stacks
//!
//! The readiness core never talks to a radio, an NTP server or a broker
//! directly. It drives these traits and consumes the lifecycle events the
//! implementations push into the channels created by [`link_events`] and
//! [`session_events`].

use std::time::SystemTime;

use tokio::sync::mpsc;

use crate::Result;
use crate::types::{LinkEvent, QoS, SessionEvent};

/// Capacity of the lifecycle event channels
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Link-layer driver (wireless association and address acquisition)
///
/// Results of `start` and `connect` only say whether the request was
/// accepted. Whether the link actually came up is reported later through
/// [`LinkEvent`]s.
#[async_trait::async_trait]
pub trait LinkDriver: Send + 'static {
    /// Bring the radio up. Emits [`LinkEvent::Started`] when done.
    async fn start(&mut self) -> Result<()>;

    /// Begin one association attempt.
    ///
    /// Success is reported with [`LinkEvent::AddressAcquired`], failure with
    /// [`LinkEvent::Disconnected`].
    async fn connect(&mut self) -> Result<()>;
}

/// Wall-clock source that is synchronized by some external protocol
#[async_trait::async_trait]
pub trait TimeSource: Send + Sync + 'static {
    /// Kick off synchronization. Called at the start of every campaign and
    /// must tolerate repeated calls.
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Current wall-clock reading, synchronized or not
    fn now(&self) -> SystemTime;
}

/// Messaging client (broker session)
///
/// Shared between the session supervisor, which connects it, and the
/// producer, which publishes through it.
#[async_trait::async_trait]
pub trait SessionClient: Send + Sync + 'static {
    /// Start the client. After the first accepted call the client is expected
    /// to reconnect on its own and report through [`SessionEvent`]s.
    async fn connect(&self) -> Result<()>;

    /// Publish one message
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<()>;
}

/// The operating system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait::async_trait]
impl TimeSource for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Sender half given to a [`LinkDriver`] implementation
pub type LinkEventSender = mpsc::Sender<LinkEvent>;

/// Sender half given to a [`SessionClient`] implementation
pub type SessionEventSender = mpsc::Sender<SessionEvent>;

/// Create the channel a link driver reports its lifecycle on
pub fn link_events() -> (LinkEventSender, mpsc::Receiver<LinkEvent>) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Create the channel a session client reports its lifecycle on
pub fn session_events() -> (SessionEventSender, mpsc::Receiver<SessionEvent>) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}
