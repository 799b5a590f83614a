//! Delivery quality for published records

use serde::{Deserialize, Serialize};

use crate::UplinkError;

/// Messaging quality-of-service level.
///
/// Serialized as its numeric level (`0`, `1`, `2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    /// Fire and forget
    AtMostOnce,

    /// Broker acknowledged, may duplicate
    AtLeastOnce,

    /// Broker acknowledged, exactly-once-attempt handshake
    #[default]
    ExactlyOnce,
}

impl QoS {
    /// Numeric level as used on the wire
    pub fn level(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = UplinkError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(UplinkError::invalid_config(
                "producer.qos",
                format!("QoS level must be 0, 1 or 2, got {other}"),
            )),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos.level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_round_trip_through_u8() {
        for level in 0u8..=2 {
            assert_eq!(QoS::try_from(level).unwrap().level(), level);
        }
        assert!(QoS::try_from(3).is_err());
    }

    #[test]
    fn default_is_level_two() {
        assert_eq!(QoS::default().level(), 2);
    }
}
