//! Opaque "is this request authenticated" fact.
//!
//! Sessions are issued and verified by the hosted auth service; the perimeter
//! only asks a probe for a yes/no answer and never inspects tokens itself.

use axum::http::{header, HeaderMap};

/// Source of the authenticated-or-not fact for a request.
pub trait IdentityProbe: Send + Sync + std::fmt::Debug {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool;
}

/// Treats the presence of a non-empty session cookie as authenticated.
#[derive(Debug, Clone)]
pub struct SessionCookieProbe {
    cookie_name: String,
}

impl SessionCookieProbe {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }
}

impl IdentityProbe for SessionCookieProbe {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .any(|(name, value)| name == self.cookie_name && !value.is_empty())
    }
}
