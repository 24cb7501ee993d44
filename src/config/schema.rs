//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the perimeter.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::security::scanner::Severity;

/// Root configuration for the perimeter service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PerimeterConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Storefront origin that receives requests surviving the filter.
    pub upstream: UpstreamConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// One-time password settings.
    pub otp: OtpConfig,

    /// Suspicious-activity escalation settings.
    pub intrusion: IntrusionConfig,

    /// Edge filter classification rules.
    pub filter: FilterConfig,

    /// Hardening response headers.
    pub headers: HeadersConfig,

    /// Threat scanner and input gate settings.
    pub scanner: ScannerConfig,

    /// Audit sink settings.
    pub audit: AuditConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API configuration.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            connect_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Upstream storefront origin.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Forward unmatched requests to the storefront.
    pub enabled: bool,

    /// Storefront address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// A single "N requests per window" rule.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct LimitRule {
    pub max_requests: u32,
    pub window_secs: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// How often expired windows are swept, in seconds.
    pub sweep_interval_secs: u64,

    /// Login validation attempts per address.
    pub login: LimitRule,

    /// OTP issuance requests per address.
    pub otp_issue: LimitRule,

    /// OTP and backup-code verification requests per address.
    pub otp_verify: LimitRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            login: LimitRule {
                max_requests: 5,
                window_secs: 60,
            },
            otp_issue: LimitRule {
                max_requests: 5,
                window_secs: 60,
            },
            otp_verify: LimitRule {
                max_requests: 10,
                window_secs: 60,
            },
        }
    }
}

/// One-time password configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OtpConfig {
    /// Code lifetime in seconds.
    pub ttl_secs: u64,

    /// Verification attempts allowed per issued code.
    pub max_attempts: u32,

    /// Backup codes generated when the request does not name a count.
    pub backup_code_count: usize,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_attempts: 3,
            backup_code_count: 10,
        }
    }
}

/// How blocked addresses are released.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AmnestyMode {
    /// A global sweep clears every block and record at once.
    #[default]
    SharedClock,
    /// Each block expires `block_ttl_secs` after its own escalation.
    PerEntry,
}

/// Suspicious-activity escalation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IntrusionConfig {
    /// Violations tolerated inside one window; one more blocks the address.
    pub threshold: u32,

    /// Length of the violation window in seconds.
    pub window_secs: u64,

    pub amnesty: AmnestyMode,

    /// Interval of the amnesty sweep in seconds.
    pub amnesty_interval_secs: u64,

    /// Block lifetime for `per_entry` amnesty, in seconds.
    pub block_ttl_secs: u64,
}

impl Default for IntrusionConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            window_secs: 300,
            amnesty: AmnestyMode::SharedClock,
            amnesty_interval_secs: 1800,
            block_ttl_secs: 1800,
        }
    }
}

/// Edge filter classification rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Case-insensitive pattern matched against the User-Agent header.
    pub bot_pattern: String,

    /// Paths under this prefix are exempt from bot detection.
    pub api_prefix: String,

    /// Redirect unauthenticated requests for admin pages to the login page.
    pub protect_admin: bool,

    pub admin_prefix: String,

    pub login_path: String,

    /// Cookie whose presence marks a request as carrying a session.
    pub session_cookie: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            bot_pattern: "bot|crawler|spider|scraper|curl|wget|python|java|postman".to_string(),
            api_prefix: "/api".to_string(),
            protect_admin: false,
            admin_prefix: "/admin".to_string(),
            login_path: "/login".to_string(),
            session_cookie: "sb-access-token".to_string(),
        }
    }
}

/// Hardening header configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeadersConfig {
    /// Stamp security headers on pass-through responses.
    pub enabled: bool,

    /// The one backend origin the content security policy trusts.
    pub trusted_origin: String,
}

impl Default for HeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trusted_origin: "https://*.supabase.co".to_string(),
        }
    }
}

/// A signature supplied through configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignatureConfig {
    pub pattern: String,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Lowest severity that makes the input gate reject a submission.
    pub reject_at: Severity,

    /// Signatures evaluated after the built-in set.
    pub extra_signatures: Vec<SignatureConfig>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            reject_at: Severity::Low,
            extra_signatures: Vec::new(),
        }
    }
}

/// Audit sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Recent events kept in memory for the admin API.
    pub buffer_size: usize,

    /// Post events to the backend's audit table.
    pub remote_enabled: bool,

    /// Table endpoint (e.g., "https://<project>.supabase.co/rest/v1/audit_logs").
    pub remote_url: String,

    pub api_key: String,

    /// Events waiting for the remote sink. Further events are dropped.
    pub remote_queue_size: usize,

    /// Per-request timeout for the remote sink in seconds.
    pub remote_timeout_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_size: 500,
            remote_enabled: false,
            remote_url: String::new(),
            api_key: String::new(),
            remote_queue_size: 1024,
            remote_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

/// Placeholder key rejected by validation while the admin API is enabled.
pub const ADMIN_KEY_PLACEHOLDER: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: ADMIN_KEY_PLACEHOLDER.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
