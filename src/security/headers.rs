//! Hardening response headers.
//!
//! The set is fixed apart from the one trusted backend origin placed in the
//! content security policy's `connect-src`. Values are compiled once and
//! stamped onto every response that passes the edge filter.

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};

const PERMISSIONS_POLICY: &str = "geolocation=(), microphone=(), camera=(), payment=(), usb=()";
const STRICT_TRANSPORT_SECURITY: &str = "max-age=31536000; includeSubDomains";

/// Build the content security policy trusting `trusted_origin` for fetches.
pub fn content_security_policy(trusted_origin: &str) -> String {
    format!(
        "default-src 'self'; \
         script-src 'self' 'unsafe-eval' 'unsafe-inline'; \
         style-src 'self' 'unsafe-inline'; \
         img-src 'self' data: https:; \
         font-src 'self' data:; \
         connect-src 'self' {}; \
         frame-ancestors 'none'; \
         base-uri 'self'",
        trusted_origin
    )
}

/// Precompiled header set.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    pub fn new(trusted_origin: &str) -> Result<Self, InvalidHeaderValue> {
        let headers = vec![
            (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
            (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
            (header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
            (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
            (
                HeaderName::from_static("permissions-policy"),
                HeaderValue::from_static(PERMISSIONS_POLICY),
            ),
            (
                header::STRICT_TRANSPORT_SECURITY,
                HeaderValue::from_static(STRICT_TRANSPORT_SECURITY),
            ),
            (
                header::CONTENT_SECURITY_POLICY,
                HeaderValue::from_str(&content_security_policy(trusted_origin))?,
            ),
        ];
        Ok(Self { headers })
    }

    /// Overwrite the hardening headers on `target`.
    pub fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(HeaderName, HeaderValue)> {
        self.headers.iter()
    }
}
