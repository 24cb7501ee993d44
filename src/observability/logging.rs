//! Structured logging setup.
//!
//! `RUST_LOG` wins over the configured level. JSON output is meant for log
//! shipping; pretty output for a terminal.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

pub fn init_logging(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
}

/// Filter used when `RUST_LOG` is unset. OTP delivery lines log under the
/// `storefront_perimeter` prefix and are covered by its directive.
pub fn default_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::new(format!(
        "storefront_perimeter={level},perimeter_cli={level},tower_http={level}",
        level = config.log_level
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::otp::DELIVERY_TARGET;
    use tracing::Level;

    #[test]
    fn test_default_filter_keeps_otp_delivery() {
        let subscriber = tracing_subscriber::registry()
            .with(default_filter(&ObservabilityConfig::default()));

        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(target: DELIVERY_TARGET, Level::INFO));
            assert!(!tracing::enabled!(target: "hyper_util", Level::INFO));
        });
    }
}
