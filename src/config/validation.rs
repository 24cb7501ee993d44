//! Configuration validation.
//!
//! Serde handles syntax; this module checks the values make sense together.
//! Every problem is reported, not just the first.

use std::net::SocketAddr;

use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::config::schema::{AmnestyMode, LimitRule, PerimeterConfig, ADMIN_KEY_PLACEHOLDER};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field}: must not exceed {max} seconds")]
    TooLong { field: &'static str, max: u64 },

    #[error("{field}: invalid pattern: {reason}")]
    InvalidPattern { field: String, reason: String },

    #[error("headers.trusted_origin: {0}")]
    InvalidOrigin(String),

    #[error("{field}: path prefix must start with '/'")]
    InvalidPrefix { field: &'static str },

    #[error("admin.api_key: placeholder key must be replaced when the admin API is enabled")]
    PlaceholderAdminKey,

    #[error("audit.remote_url: {0}")]
    InvalidRemoteUrl(String),
}

/// Longest accepted window, TTL or interval. Store deadlines are computed as
/// `Instant + Duration`, which must not overflow.
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &PerimeterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.upstream.enabled {
        check_address(&mut errors, "upstream.address", &config.upstream.address);
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() || config.admin.api_key == ADMIN_KEY_PLACEHOLDER {
            errors.push(ValidationError::PlaceholderAdminKey);
        }
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    check_duration(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);
    check_duration(&mut errors, "timeouts.connect_secs", config.timeouts.connect_secs);
    check_nonzero(&mut errors, "limits.max_body_size", config.limits.max_body_size as u64);
    check_duration(
        &mut errors,
        "rate_limit.sweep_interval_secs",
        config.rate_limit.sweep_interval_secs,
    );
    check_rule(&mut errors, "rate_limit.login", &config.rate_limit.login);
    check_rule(&mut errors, "rate_limit.otp_issue", &config.rate_limit.otp_issue);
    check_rule(&mut errors, "rate_limit.otp_verify", &config.rate_limit.otp_verify);

    check_duration(&mut errors, "otp.ttl_secs", config.otp.ttl_secs);
    check_nonzero(&mut errors, "otp.max_attempts", config.otp.max_attempts as u64);

    check_duration(&mut errors, "intrusion.window_secs", config.intrusion.window_secs);
    check_duration(
        &mut errors,
        "intrusion.amnesty_interval_secs",
        config.intrusion.amnesty_interval_secs,
    );
    if config.intrusion.amnesty == AmnestyMode::PerEntry {
        check_duration(&mut errors, "intrusion.block_ttl_secs", config.intrusion.block_ttl_secs);
    }

    if let Err(e) = Regex::new(&config.filter.bot_pattern) {
        errors.push(ValidationError::InvalidPattern {
            field: "filter.bot_pattern".to_string(),
            reason: e.to_string(),
        });
    }
    for (field, prefix) in [
        ("filter.api_prefix", &config.filter.api_prefix),
        ("filter.admin_prefix", &config.filter.admin_prefix),
        ("filter.login_path", &config.filter.login_path),
    ] {
        if !prefix.starts_with('/') {
            errors.push(ValidationError::InvalidPrefix { field });
        }
    }

    for (i, sig) in config.scanner.extra_signatures.iter().enumerate() {
        if let Err(e) = Regex::new(&sig.pattern) {
            errors.push(ValidationError::InvalidPattern {
                field: format!("scanner.extra_signatures[{}]", i),
                reason: e.to_string(),
            });
        }
    }

    if let Err(reason) = check_origin(&config.headers.trusted_origin) {
        errors.push(ValidationError::InvalidOrigin(reason));
    }

    if config.audit.remote_enabled {
        check_nonzero(&mut errors, "audit.remote_queue_size", config.audit.remote_queue_size as u64);
        check_duration(&mut errors, "audit.remote_timeout_secs", config.audit.remote_timeout_secs);
        match Url::parse(&config.audit.remote_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ValidationError::InvalidRemoteUrl(format!(
                "unsupported scheme {:?}",
                url.scheme()
            ))),
            Err(e) => errors.push(ValidationError::InvalidRemoteUrl(e.to_string())),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_nonzero(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::Zero { field });
    }
}

fn check_duration(errors: &mut Vec<ValidationError>, field: &'static str, secs: u64) {
    if secs == 0 {
        errors.push(ValidationError::Zero { field });
    } else if secs > MAX_DURATION_SECS {
        errors.push(ValidationError::TooLong {
            field,
            max: MAX_DURATION_SECS,
        });
    }
}

fn check_rule(errors: &mut Vec<ValidationError>, field: &'static str, rule: &LimitRule) {
    if rule.max_requests == 0 || rule.window_secs == 0 {
        errors.push(ValidationError::Zero { field });
    } else if rule.window_secs > MAX_DURATION_SECS {
        errors.push(ValidationError::TooLong {
            field,
            max: MAX_DURATION_SECS,
        });
    }
}

/// A CSP source origin: scheme and host only, optionally with a leading
/// `*.` wildcard label.
fn check_origin(origin: &str) -> Result<(), String> {
    let normalized = origin.replacen("://*.", "://", 1);
    let url = Url::parse(&normalized).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {:?}", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    if url.path() != "/" || url.query().is_some() || origin.ends_with('/') {
        return Err("must be a bare origin without path or query".to_string());
    }
    if origin.contains(';') || origin.contains(char::is_whitespace) {
        return Err("must be a single source expression".to_string());
    }
    Ok(())
}
