//! Hot-swappable edge policy.
//!
//! Everything the edge filter and login/OTP handlers read per request lives
//! here so a config reload can replace it in one atomic store. The stores it
//! feeds (rate windows, tracker, OTP records) are not part of the policy and
//! survive a reload.

use std::sync::Arc;

use axum::http::{header::InvalidHeaderValue, HeaderMap};
use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::config::{LimitRule, PerimeterConfig};
use crate::security::headers::SecurityHeaders;
use crate::security::identity::{IdentityProbe, SessionCookieProbe};

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid bot pattern: {0}")]
    BotPattern(#[from] regex::Error),

    #[error("invalid security header value: {0}")]
    Header(#[from] InvalidHeaderValue),
}

#[derive(Debug)]
pub struct EdgePolicy {
    bot_pattern: Regex,
    api_prefix: String,
    protect_admin: bool,
    admin_prefix: String,
    login_path: String,
    identity: Arc<dyn IdentityProbe>,
    headers: Option<SecurityHeaders>,
    pub login: LimitRule,
    pub otp_issue: LimitRule,
    pub otp_verify: LimitRule,
}

impl EdgePolicy {
    pub fn from_config(config: &PerimeterConfig) -> Result<Self, PolicyError> {
        let probe = SessionCookieProbe::new(config.filter.session_cookie.clone());
        Self::with_identity(config, Arc::new(probe))
    }

    pub fn with_identity(
        config: &PerimeterConfig,
        identity: Arc<dyn IdentityProbe>,
    ) -> Result<Self, PolicyError> {
        let bot_pattern = RegexBuilder::new(&config.filter.bot_pattern)
            .case_insensitive(true)
            .build()?;
        let headers = if config.headers.enabled {
            Some(SecurityHeaders::new(&config.headers.trusted_origin)?)
        } else {
            None
        };

        Ok(Self {
            bot_pattern,
            api_prefix: config.filter.api_prefix.clone(),
            protect_admin: config.filter.protect_admin,
            admin_prefix: config.filter.admin_prefix.clone(),
            login_path: config.filter.login_path.clone(),
            identity,
            headers,
            login: config.rate_limit.login,
            otp_issue: config.rate_limit.otp_issue,
            otp_verify: config.rate_limit.otp_verify,
        })
    }

    pub fn is_bot(&self, user_agent: &str) -> bool {
        self.bot_pattern.is_match(user_agent)
    }

    pub fn is_api_path(&self, path: &str) -> bool {
        path.starts_with(&self.api_prefix)
    }

    /// Admin pages that need a redirect: guard enabled, path under the admin
    /// prefix, and the identity probe says no.
    pub fn needs_login(&self, path: &str, headers: &HeaderMap) -> bool {
        self.protect_admin
            && path.starts_with(&self.admin_prefix)
            && !self.identity.is_authenticated(headers)
    }

    pub fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        self.identity.is_authenticated(headers)
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn security_headers(&self) -> Option<&SecurityHeaders> {
        self.headers.as_ref()
    }
}

/// True when the path carries a traversal sequence, in any letter case.
pub fn is_traversal(path: &str) -> bool {
    path.contains("..") || path.to_ascii_lowercase().contains("%2e%2e")
}
