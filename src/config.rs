//! Device configuration
//!
//! Loaded once at startup from YAML and read-only afterwards. Every field has a
//! default, so an empty document is a valid configuration:
//!
//! ```yaml
//! link:
//!   ssid: IoT_Network
//!   passphrase: "12345678"
//!   retry: { first_ms: 100, max_ms: 30000, factor: 2.0, jitter: equal }
//! time:
//!   server: pool.ntp.org
//!   poll_interval_ms: 500
//!   min_year: 2016
//!   timeout_ms: null
//!   resync_on_reconnect: false
//! session:
//!   uri: mqtt://broker.hivemq.com
//!   clear_on_disconnect: true
//! producer:
//!   topic: iot/test1
//!   qos: 2
//!   retain: false
//!   interval_ms: 2000
//! logging:
//!   filter: info
//!   format: compact
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::retry::{BackoffPolicy, millis};
use crate::types::QoS;
use crate::{Result, UplinkError};

/// Complete device configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    pub link: LinkConfig,
    pub time: TimeConfig,
    pub session: SessionConfig,
    pub producer: ProducerConfig,
    pub logging: LoggingConfig,
}

/// Log output settings; `RUST_LOG` overrides `filter`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing-subscriber` filter directive, e.g. `info,uplink=debug`
    pub filter: String,
    pub format: LogFormat,
}

/// Console log layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

/// Wireless link credentials and reconnect pacing
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    pub ssid: String,
    pub passphrase: String,
    pub retry: BackoffPolicy,
}

/// Time synchronization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeConfig {
    /// Server handed to the time source when a campaign starts
    pub server: String,

    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,

    /// Clock readings before this year count as unsynchronized
    pub min_year: i32,

    /// Bound on one campaign; `None` waits forever
    #[serde(rename = "timeout_ms", with = "millis::option")]
    pub timeout: Option<Duration>,

    /// Run a fresh campaign on every link-up instead of only the first
    pub resync_on_reconnect: bool,
}

/// Messaging session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Broker endpoint, e.g. `mqtt://broker.hivemq.com`
    pub uri: String,

    /// Clear the session flag when the session drops
    pub clear_on_disconnect: bool,

    /// Pacing for refused `connect` calls
    pub retry: BackoffPolicy,
}

/// Telemetry producer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProducerConfig {
    pub topic: String,
    pub qos: QoS,
    pub retain: bool,

    /// Pause between publishes
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ssid: "IoT_Network".to_string(),
            passphrase: "12345678".to_string(),
            retry: BackoffPolicy::default(),
        }
    }
}

impl fmt::Debug for LinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkConfig")
            .field("ssid", &self.ssid)
            .field("passphrase", &"<redacted>")
            .field("retry", &self.retry)
            .finish()
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            server: "pool.ntp.org".to_string(),
            poll_interval: Duration::from_millis(500),
            min_year: 2016,
            timeout: None,
            resync_on_reconnect: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            uri: "mqtt://broker.hivemq.com".to_string(),
            clear_on_disconnect: true,
            retry: BackoffPolicy::default(),
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            topic: "iot/test1".to_string(),
            qos: QoS::ExactlyOnce,
            retain: false,
            interval: Duration::from_millis(2000),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "info".to_string(), format: LogFormat::Compact }
    }
}

const URI_SCHEMES: [&str; 4] = ["mqtt://", "mqtts://", "ws://", "wss://"];

impl DeviceConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: DeviceConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading device config from {}", path.display());
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| UplinkError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml(&yaml)
    }

    /// Check every section, reporting the first offending field
    pub fn validate(&self) -> Result<()> {
        self.link.validate()?;
        self.time.validate()?;
        self.session.validate()?;
        self.producer.validate()
    }
}

impl LinkConfig {
    fn validate(&self) -> Result<()> {
        if self.ssid.is_empty() || self.ssid.len() > 32 {
            return Err(UplinkError::invalid_config("link.ssid", "must be 1 to 32 bytes"));
        }
        let pass_len = self.passphrase.chars().count();
        if !self.passphrase.is_empty() && !(8..=63).contains(&pass_len) {
            return Err(UplinkError::invalid_config(
                "link.passphrase",
                "must be empty (open network) or 8 to 63 characters",
            ));
        }
        self.retry.validate("link.retry")
    }
}

impl TimeConfig {
    fn validate(&self) -> Result<()> {
        if self.server.trim().is_empty() {
            return Err(UplinkError::invalid_config("time.server", "must not be empty"));
        }
        if self.poll_interval.is_zero() {
            return Err(UplinkError::invalid_config("time.poll_interval_ms", "must be positive"));
        }
        if self.min_year < 1970 {
            return Err(UplinkError::invalid_config("time.min_year", "must be 1970 or later"));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(UplinkError::invalid_config(
                "time.timeout_ms",
                "must be positive, or null to wait forever",
            ));
        }
        Ok(())
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<()> {
        let host = URI_SCHEMES.iter().find_map(|scheme| self.uri.strip_prefix(scheme));
        match host {
            None => Err(UplinkError::invalid_config(
                "session.uri",
                format!("expected one of {} schemes, got {:?}", URI_SCHEMES.join(" "), self.uri),
            )),
            Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with(':') => {
                Err(UplinkError::invalid_config("session.uri", "missing host"))
            }
            Some(_) => self.retry.validate("session.retry"),
        }
    }
}

impl ProducerConfig {
    fn validate(&self) -> Result<()> {
        if self.topic.is_empty() {
            return Err(UplinkError::invalid_config("producer.topic", "must not be empty"));
        }
        if self.topic.contains(['+', '#']) {
            return Err(UplinkError::invalid_config(
                "producer.topic",
                "wildcards are not allowed in a publish topic",
            ));
        }
        if self.interval.is_zero() {
            return Err(UplinkError::invalid_config("producer.interval_ms", "must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_firmware_defaults() {
        let config = DeviceConfig::from_yaml("{}").unwrap();

        assert_eq!(config.link.ssid, "IoT_Network");
        assert_eq!(config.session.uri, "mqtt://broker.hivemq.com");
        assert_eq!(config.time.server, "pool.ntp.org");
        assert_eq!(config.time.poll_interval, Duration::from_millis(500));
        assert_eq!(config.time.min_year, 2016);
        assert_eq!(config.time.timeout, None);
        assert!(!config.time.resync_on_reconnect);
        assert_eq!(config.producer.topic, "iot/test1");
        assert_eq!(config.producer.qos, QoS::ExactlyOnce);
        assert!(!config.producer.retain);
        assert_eq!(config.producer.interval, Duration::from_secs(2));
        assert_eq!(config.logging.filter, "info");
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn partial_sections_override_only_given_fields() {
        let yaml = r#"
link:
  ssid: lab
  retry: { first_ms: 50, max_ms: 500, factor: 1.5, jitter: none }
time:
  timeout_ms: 30000
  resync_on_reconnect: true
producer:
  qos: 1
  interval_ms: 250
"#;
        let config = DeviceConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.link.ssid, "lab");
        assert_eq!(config.link.passphrase, "12345678");
        assert_eq!(config.link.retry.max, Duration::from_millis(500));
        assert_eq!(config.time.timeout, Some(Duration::from_secs(30)));
        assert!(config.time.resync_on_reconnect);
        assert_eq!(config.producer.qos, QoS::AtLeastOnce);
        assert_eq!(config.producer.interval, Duration::from_millis(250));
        assert_eq!(config.producer.topic, "iot/test1");
    }

    #[test]
    fn invalid_fields_are_named_in_the_error() {
        let cases = [
            ("link: { ssid: '' }", "link.ssid"),
            ("link: { passphrase: short }", "link.passphrase"),
            ("link: { retry: { factor: 0.5 } }", "link.retry.factor"),
            ("time: { poll_interval_ms: 0 }", "time.poll_interval_ms"),
            ("time: { timeout_ms: 0 }", "time.timeout_ms"),
            ("session: { uri: 'http://broker' }", "session.uri"),
            ("session: { uri: 'mqtt://' }", "session.uri"),
            ("producer: { topic: 'iot/#' }", "producer.topic"),
            ("producer: { interval_ms: 0 }", "producer.interval_ms"),
        ];

        for (yaml, field) in cases {
            match DeviceConfig::from_yaml(yaml) {
                Err(UplinkError::Config { field: got, .. }) => assert_eq!(got, field, "{yaml}"),
                other => panic!("{yaml}: expected config error for {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn bad_qos_level_is_rejected() {
        assert!(DeviceConfig::from_yaml("producer: { qos: 3 }").is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = DeviceConfig::from_yaml("link: { bssid: aa:bb }");
        assert!(matches!(result, Err(UplinkError::Parse { .. })));
    }

    #[test]
    fn open_network_passphrase_is_allowed() {
        let config = DeviceConfig::from_yaml("link: { passphrase: '' }").unwrap();
        assert!(config.link.passphrase.is_empty());
    }

    #[test]
    fn debug_output_redacts_passphrase() {
        let config = DeviceConfig::default();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("12345678"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn missing_file_reports_path() {
        let result = DeviceConfig::load("/nonexistent/uplink.yaml");
        match result {
            Err(UplinkError::File { path, .. }) => {
                assert_eq!(path, std::path::PathBuf::from("/nonexistent/uplink.yaml"))
            }
            other => panic!("expected file error, got {other:?}"),
        }
    }

    #[test]
    fn serialized_defaults_parse_back() {
        let yaml = serde_yaml_ng::to_string(&DeviceConfig::default()).unwrap();
        assert_eq!(DeviceConfig::from_yaml(&yaml).unwrap(), DeviceConfig::default());
    }
}
