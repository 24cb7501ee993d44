//! Login validation and second-factor endpoints.
//!
//! Rate limits are keyed per client address, one scope per endpoint family:
//! `login:<addr>`, `otp:<addr>`, `otp_verify:<addr>`. Verification endpoints
//! answer uniformly so a caller cannot tell an expired code from a wrong one.

use std::sync::LazyLock;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::config::LimitRule;
use crate::http::request::ClientInfo;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::audit::SecurityEventKind;
use crate::observability::metrics;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(EMAIL_PATTERN).expect("email pattern is a valid regex"));

/// Upper bound on backup codes produced by one request.
const MAX_BACKUP_CODES: usize = 50;

fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Unwrap a JSON body, answering malformed input with the JSON error shape.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

fn limit(state: &AppState, scope: &'static str, address: &str, rule: &LimitRule) -> Result<(), ApiError> {
    if state.limiter.check_rule(&format!("{}:{}", scope, address), rule) {
        return Ok(());
    }
    tracing::warn!(client = %address, scope, "Rate limit exceeded");
    metrics::record_rate_limited(scope);
    Err(ApiError::RateLimited)
}

fn verification(verified: bool) -> Response {
    let status = if verified { StatusCode::OK } else { StatusCode::UNAUTHORIZED };
    (status, Json(json!({ "verified": verified }))).into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// `POST /api/auth/validate`
pub async fn validate_login(
    State(state): State<AppState>,
    client: ClientInfo,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let policy = state.policy.load();
    limit(&state, "login", &client.address, &policy.login)?;

    let body = json_body(body)?;
    let sanitizer = state.gate.scanner().sanitizer();
    let email = body
        .email
        .map(|e| sanitizer.sanitize_str(&e))
        .filter(|e| !e.is_empty());
    let password = body.password.filter(|p| !p.is_empty());

    let (Some(email), Some(_)) = (email, password) else {
        return Err(ApiError::BadRequest("Email and password are required".into()));
    };
    if !is_valid_email(&email) {
        state.audit.log_security_event(
            SecurityEventKind::FailedAuth,
            None,
            &client.address,
            &client.user_agent,
            json!({ "reason": "malformed_email" }),
        );
        return Err(ApiError::BadRequest("Invalid email format".into()));
    }

    state.audit.log_security_event(
        SecurityEventKind::LoginAttempt,
        Some(&email),
        &client.address,
        &client.user_agent,
        json!({}),
    );
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    pub subject: String,
}

/// `POST /api/auth/otp`
pub async fn issue_otp(
    State(state): State<AppState>,
    client: ClientInfo,
    body: Result<Json<IssueRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let policy = state.policy.load();
    limit(&state, "otp", &client.address, &policy.otp_issue)?;
    let body = json_body(body)?;

    let subject = body.subject.trim();
    if subject.is_empty() {
        return Err(ApiError::BadRequest("Subject is required".into()));
    }

    let code = state.otp.issue(subject);
    state.otp_delivery.deliver(subject, &code);

    Ok((StatusCode::ACCEPTED, Json(json!({ "issued": true }))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub subject: String,
    pub code: String,
}

/// `POST /api/auth/otp/verify`
pub async fn verify_otp(
    State(state): State<AppState>,
    client: ClientInfo,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let policy = state.policy.load();
    limit(&state, "otp_verify", &client.address, &policy.otp_verify)?;
    let body = json_body(body)?;

    let subject = body.subject.trim();
    let verified = state.otp.verify(subject, body.code.trim());
    audit_verification(&state, &client, subject, "otp", verified);
    Ok(verification(verified))
}

#[derive(Debug, Deserialize)]
pub struct BackupCodesRequest {
    pub subject: String,
    pub count: Option<usize>,
}

/// `POST /api/auth/backup-codes`
///
/// Only an authenticated session may mint codes. The plaintext codes are
/// returned once; the vault keeps hashes.
pub async fn generate_backup_codes(
    State(state): State<AppState>,
    client: ClientInfo,
    headers: HeaderMap,
    body: Result<Json<BackupCodesRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.policy.load().is_authenticated(&headers) {
        return Err(ApiError::Unauthorized);
    }
    let body = json_body(body)?;
    let subject = body.subject.trim();
    if subject.is_empty() {
        return Err(ApiError::BadRequest("Subject is required".into()));
    }
    let count = body.count.unwrap_or(state.otp_config.backup_code_count);
    if count == 0 || count > MAX_BACKUP_CODES {
        return Err(ApiError::BadRequest(format!(
            "Count must be between 1 and {}",
            MAX_BACKUP_CODES
        )));
    }

    let codes = state.backup_codes.regenerate(subject, count);
    state.audit.log_security_event(
        SecurityEventKind::DataExport,
        Some(subject),
        &client.address,
        &client.user_agent,
        json!({ "backup_codes": count }),
    );
    Ok(Json(json!({ "codes": codes })))
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub subject: String,
    pub code: String,
}

/// `POST /api/auth/backup-codes/redeem`
pub async fn redeem_backup_code(
    State(state): State<AppState>,
    client: ClientInfo,
    body: Result<Json<RedeemRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let policy = state.policy.load();
    limit(&state, "otp_verify", &client.address, &policy.otp_verify)?;
    let body = json_body(body)?;

    let subject = body.subject.trim();
    let verified = state.backup_codes.redeem(subject, &body.code);
    audit_verification(&state, &client, subject, "backup_code", verified);
    Ok(verification(verified))
}

fn audit_verification(state: &AppState, client: &ClientInfo, subject: &str, method: &str, verified: bool) {
    let kind = if verified {
        SecurityEventKind::LoginAttempt
    } else {
        SecurityEventKind::FailedAuth
    };
    state.audit.log_security_event(
        kind,
        Some(subject),
        &client.address,
        &client.user_agent,
        json!({ "second_factor": method }),
    );
}
