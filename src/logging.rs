//! Console logging setup
//!
//! Library code only emits `tracing` events. Binaries call [`init`] once at
//! startup to install a formatter; `RUST_LOG` takes precedence over the
//! configured filter.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::{Result, UplinkError};

/// Install the global `tracing` subscriber.
///
/// Fails if the filter does not parse or a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| UplinkError::invalid_config("logging.filter", e.to_string()))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    installed.map_err(|e| UplinkError::invalid_config("logging", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_filter() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config =
            LoggingConfig { filter: "uplink=notalevel".to_string(), ..LoggingConfig::default() };
        let result = init(&config);
        assert!(matches!(result, Err(UplinkError::Config { .. })));
    }
}
