//! Core data types shared by the supervisors and the producer.
//!
//! - [`TelemetryRecord`] is the unit of work published on the session
//! - [`QoS`] is the delivery guarantee requested for each publish
//! - [`LinkState`] and [`SessionState`] are the observable lifecycle states
//! - [`LinkEvent`] and [`SessionEvent`] are what drivers report back
//!
//! ```rust
//! use uplink::types::{QoS, TelemetryRecord};
//!
//! let record = TelemetryRecord::new(3, 1_700_000_000_123);
//! assert_eq!(record.to_string(), "3,1700000000123");
//! assert_eq!(QoS::default().level(), 2);
//! ```

mod qos;
mod record;
mod state;

pub use qos::QoS;
pub use record::{TelemetryRecord, epoch_millis};
pub use state::{LinkEvent, LinkState, SessionEvent, SessionState};
