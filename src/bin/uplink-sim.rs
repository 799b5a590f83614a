//! Run a simulated device end to end and print what it publishes.
//!
//! ```text
//! uplink-sim [CONFIG.yaml] [SECONDS]
//! ```
//!
//! The simulated link fails its first association, the clock syncs 1.5 s after
//! link-up and the broker handshake takes 300 ms.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::StreamExt;
use tracing::{info, warn};
use uplink::sim::{ConnectOutcome, SimClock, SimLink, SimSession};
use uplink::{
    Device, DeviceConfig, DeviceParts, WaitOutcome, link_events, logging, session_events,
};

const DEFAULT_RUN_SECS: u64 = 20;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);

    let config = match args.next() {
        Some(path) => DeviceConfig::load(&path)
            .with_context(|| format!("loading device config from {path}"))?,
        None => DeviceConfig::default(),
    };
    let run_for = match args.next() {
        Some(secs) => Duration::from_secs(secs.parse().context("run time must be whole seconds")?),
        None => Duration::from_secs(DEFAULT_RUN_SECS),
    };

    logging::init(&config.logging)?;

    let (link_tx, link_rx) = link_events();
    let (session_tx, session_rx) = session_events();
    let (link, control) = SimLink::new(link_tx);
    control.script([ConnectOutcome::Fail("no AP found".to_string())]);

    let session = Arc::new(SimSession::new(session_tx, Duration::from_millis(300)));
    let device = Device::boot(
        &config,
        DeviceParts {
            link: link.with_association_delay(Duration::from_millis(200)),
            link_events: link_rx,
            clock: Arc::new(SimClock::from_system(Duration::from_millis(1500))),
            session: Arc::clone(&session),
            session_events: session_rx,
        },
    )?;

    match device.wait_ready(Some(Duration::from_secs(30))).await {
        WaitOutcome::Ready => info!("Device ready: {:?}", device.readiness().snapshot()),
        outcome => warn!("Device not ready: {:?}", outcome),
    }

    let mut records = std::pin::pin!(device.records().take_until(tokio::time::sleep(run_for)));
    while let Some(record) = records.next().await {
        println!("{record}");
    }

    info!(
        "Published {} records after {} link attempts",
        session.published().len(),
        control.attempts()
    );
    device.shutdown().await?;
    Ok(())
}
