//! Telemetry record and its wire payload

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{Result, UplinkError};

/// One telemetry sample as published on the session.
///
/// The wire form is ASCII `"<sequence>,<timestamp_ms>"` with no escaping and
/// no length prefix, e.g. `"42,1700000000123"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TelemetryRecord {
    /// Publish counter, starting at 0
    pub sequence: u32,

    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl TelemetryRecord {
    /// Create a record
    pub fn new(sequence: u32, timestamp_ms: u64) -> Self {
        Self { sequence, timestamp_ms }
    }

    /// Create a record stamped from a wall-clock reading
    pub fn stamped(sequence: u32, now: SystemTime) -> Self {
        Self::new(sequence, epoch_millis(now))
    }

    /// Encode the wire payload
    pub fn to_payload(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.sequence, self.timestamp_ms)
    }
}

impl FromStr for TelemetryRecord {
    type Err = UplinkError;

    fn from_str(payload: &str) -> Result<Self> {
        let (sequence, timestamp) = payload.split_once(',').ok_or_else(|| {
            UplinkError::parse_error("telemetry payload", format!("missing ',' in {payload:?}"))
        })?;

        let sequence = sequence.parse::<u32>().map_err(|e| {
            UplinkError::parse_error("telemetry payload", format!("bad sequence {sequence:?}: {e}"))
        })?;
        let timestamp_ms = timestamp.parse::<u64>().map_err(|e| {
            UplinkError::parse_error(
                "telemetry payload",
                format!("bad timestamp {timestamp:?}: {e}"),
            )
        })?;

        Ok(Self { sequence, timestamp_ms })
    }
}

/// Milliseconds since the Unix epoch; readings before the epoch clamp to 0.
pub fn epoch_millis(now: SystemTime) -> u64 {
    now.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn payload_matches_wire_format() {
        let record = TelemetryRecord::new(42, 1_700_000_000_123);
        assert_eq!(record.to_string(), "42,1700000000123");
        assert_eq!(record.to_payload(), b"42,1700000000123".to_vec());
    }

    #[test]
    fn stamped_truncates_to_millis() {
        let now = UNIX_EPOCH + Duration::from_micros(1_700_000_000_123_999);
        let record = TelemetryRecord::stamped(0, now);
        assert_eq!(record.timestamp_ms, 1_700_000_000_123);
    }

    #[test]
    fn pre_epoch_clock_clamps_to_zero() {
        let before = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(epoch_millis(before), 0);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        for bad in ["", "42", "42;17", "-1,5", "1,x", "1,2,3", " 1,2"] {
            let parsed = bad.parse::<TelemetryRecord>();
            assert!(
                matches!(parsed, Err(UplinkError::Parse { .. })),
                "{bad:?} should not parse"
            );
        }
    }

    proptest! {
        #[test]
        fn payload_is_ascii_with_single_separator(sequence in any::<u32>(), ts in any::<u64>()) {
            let payload = TelemetryRecord::new(sequence, ts).to_string();
            prop_assert!(payload.is_ascii());
            prop_assert_eq!(payload.matches(',').count(), 1);
            let parsed = payload.parse::<TelemetryRecord>().unwrap();
            prop_assert_eq!(parsed, TelemetryRecord::new(sequence, ts));
        }
    }
}
