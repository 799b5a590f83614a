//! Error types for device bring-up and telemetry publishing.
//!
//! Nothing in the readiness core is fatal: connectivity failures are absorbed
//! by the owning supervisor and retried. The errors below surface only where a
//! caller can act on them, such as a bounded time-sync campaign that ran out of
//! time, a publish the session refused, or a configuration file that does not
//! validate.
//!
//! ## Error Categories
//!
//! - **Link / Session Errors**: collaborator calls that were refused
//! - **Time Sync Errors**: the time source never reached a plausible year
//! - **Publish Errors**: a telemetry record was not accepted by the session
//! - **Configuration Errors**: missing, unreadable or invalid settings
//! - **Task Errors**: a device task panicked
//!
//! ```rust
//! use uplink::UplinkError;
//! use std::time::Duration;
//!
//! let error = UplinkError::TimeSyncTimeout { duration: Duration::from_secs(30) };
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for uplink operations.
pub type Result<T, E = UplinkError> = std::result::Result<T, E>;

/// Boxed source error carried by collaborator failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for uplink operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UplinkError {
    #[error("Link operation failed: {reason}")]
    Link {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Session operation failed: {reason}")]
    Session {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Time sync did not complete within {duration:?}")]
    TimeSyncTimeout { duration: Duration },

    #[error("Failed to publish record {sequence} on '{topic}'")]
    PublishFailed {
        topic: String,
        sequence: u32,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Invalid configuration for '{field}': {reason}")]
    Config { field: String, reason: String },

    #[error("Config file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("{operation} was cancelled")]
    Cancelled { operation: &'static str },

    #[error("{task} task failed")]
    Task {
        task: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl UplinkError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            UplinkError::Link { .. } => true,
            UplinkError::Session { .. } => true,
            UplinkError::TimeSyncTimeout { .. } => true,
            UplinkError::PublishFailed { .. } => true,
            UplinkError::Config { .. } => false,
            UplinkError::File { .. } => false,
            UplinkError::Parse { .. } => false,
            UplinkError::Cancelled { .. } => false,
            UplinkError::Task { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            UplinkError::Link { .. } => vec![
                "Check the access point is in range",
                "Verify SSID and passphrase",
                "Power-cycle the radio",
            ],
            UplinkError::Session { .. } => vec![
                "Check the broker URI",
                "Verify the broker is reachable from the device network",
            ],
            UplinkError::TimeSyncTimeout { .. } => vec![
                "Check the time server is reachable",
                "Increase the time sync timeout",
                "Wait for the next link-up to retry",
            ],
            UplinkError::PublishFailed { .. } => vec![
                "Check the session is connected",
                "The record is skipped and the next cycle retries",
            ],
            UplinkError::Config { .. } => vec![
                "Fix the reported configuration field",
                "Remove the field to fall back to its default",
            ],
            UplinkError::File { .. } => vec![
                "Check the config file exists and is readable",
                "Check file permissions",
            ],
            UplinkError::Parse { .. } => vec![
                "Check the input format",
                "Verify source data integrity",
            ],
            UplinkError::Cancelled { .. } => vec!["Restart the device to resume"],
            UplinkError::Task { .. } => vec![
                "Check the logs for the panic message",
                "Restart the device",
            ],
        }
    }

    /// Helper constructor for link errors.
    pub fn link_failed(reason: impl Into<String>) -> Self {
        UplinkError::Link { reason: reason.into(), source: None }
    }

    /// Helper constructor for session errors.
    pub fn session_failed(reason: impl Into<String>) -> Self {
        UplinkError::Session { reason: reason.into(), source: None }
    }

    /// Helper constructor for publish failures, keeping the collaborator error as source.
    pub fn publish_failed(topic: impl Into<String>, sequence: u32, source: UplinkError) -> Self {
        UplinkError::PublishFailed { topic: topic.into(), sequence, source: Some(Box::new(source)) }
    }

    /// Helper constructor for configuration errors.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        UplinkError::Config { field: field.into(), reason: reason.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        UplinkError::File { path, source }
    }

    /// Helper constructor for parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        UplinkError::Parse { context: context.into(), details: details.into() }
    }
}

impl From<serde_yaml_ng::Error> for UplinkError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        UplinkError::Parse { context: "device config".to_string(), details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn error_messages_carry_their_context(
            reason in ".*",
            field in "\\w+",
            topic in "[a-z/0-9]+",
            sequence in any::<u32>(),
            duration_ms in 1u64..600_000u64
        ) {
            let link = UplinkError::link_failed(reason.clone());
            prop_assert!(link.to_string().contains(&reason));

            let config = UplinkError::invalid_config(field.clone(), reason.clone());
            prop_assert!(config.to_string().contains(&field));

            let publish = UplinkError::publish_failed(
                topic.clone(),
                sequence,
                UplinkError::session_failed("not connected"),
            );
            let msg = publish.to_string();
            prop_assert!(msg.contains(&topic));
            prop_assert!(msg.contains(&sequence.to_string()));

            let timeout =
                UplinkError::TimeSyncTimeout { duration: Duration::from_millis(duration_ms) };
            prop_assert!(!timeout.to_string().is_empty());
        }
    }

    #[test]
    fn publish_failure_keeps_session_error_as_source() {
        let error =
            UplinkError::publish_failed("iot/test1", 7, UplinkError::session_failed("broker gone"));

        let source = std::error::Error::source(&error).expect("source should be kept");
        assert!(source.to_string().contains("broker gone"));
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<UplinkError>();

        let error = UplinkError::link_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retry_classification() {
        assert!(UplinkError::link_failed("x").is_retryable());
        assert!(UplinkError::TimeSyncTimeout { duration: Duration::from_secs(1) }.is_retryable());
        assert!(!UplinkError::invalid_config("link.ssid", "empty").is_retryable());
        assert!(!UplinkError::Cancelled { operation: "time sync" }.is_retryable());

        for suggestion in UplinkError::session_failed("x").recovery_suggestions() {
            assert!(suggestion.len() > 5);
        }
    }

    #[test]
    fn yaml_errors_become_parse_errors() {
        let yaml_err = serde_yaml_ng::from_str::<u32>("not: [a number").unwrap_err();
        let error: UplinkError = yaml_err.into();
        assert!(matches!(error, UplinkError::Parse { .. }));
    }
}
