//! Edge request filter.
//! Classifies every request before any route runs; first matching rule wins.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::http::request::{client_address, user_agent};
use crate::http::response::{login_redirect, BlockReason};
use crate::http::server::AppState;
use crate::observability::audit::{AuditEvent, AuditStatus};
use crate::observability::metrics;
use crate::security::intrusion::TrackOutcome;
use crate::security::policy::is_traversal;

pub async fn edge_filter(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let address = client_address(request.headers(), request.extensions());
    let path = request.uri().path().to_string();
    let policy = state.policy.load_full();

    // 1. Blocked addresses get nothing else evaluated.
    if state.tracker.is_blocked(&address) {
        tracing::warn!(client = %address, path = %path, "Blocked address attempted access");
        return reject(BlockReason::Blocked);
    }

    // 2. Automation on page routes. API routes are exempt.
    let agent = user_agent(request.headers()).to_string();
    if policy.is_bot(&agent) && !policy.is_api_path(&path) {
        return escalate(&state, BlockReason::Bot, address, agent, path);
    }

    // 3. Traversal sequences.
    if is_traversal(&path) {
        return escalate(&state, BlockReason::Traversal, address, agent, path);
    }

    // 4. Admin pages without a session.
    if policy.needs_login(&path, request.headers()) {
        tracing::debug!(client = %address, path = %path, "Redirecting unauthenticated admin request");
        return login_redirect(policy.login_path());
    }

    let mut response = next.run(request).await;
    if let Some(headers) = policy.security_headers() {
        headers.apply(response.headers_mut());
    }
    response
}

fn reject(reason: BlockReason) -> Response {
    metrics::record_blocked(reason.as_str());
    reason.into_response()
}

/// Count the violation against the address, audit it and reject.
fn escalate(
    state: &AppState,
    reason: BlockReason,
    address: String,
    agent: String,
    path: String,
) -> Response {
    let outcome = state.tracker.track(&address);
    let count = match outcome {
        TrackOutcome::Flagged { count }
        | TrackOutcome::Escalated { count }
        | TrackOutcome::AlreadyBlocked { count } => count,
    };
    tracing::warn!(client = %address, path = %path, reason = reason.as_str(), violations = count, "Request blocked at edge");

    let mut details = json!({ "path": path, "violations": count });
    if matches!(outcome, TrackOutcome::Escalated { .. }) {
        details["escalated"] = json!(true);
    }
    state.audit.record(
        AuditEvent::new(reason.as_str(), "edge", address, agent, AuditStatus::Suspicious)
            .with_details(details),
    );

    reject(reason)
}
