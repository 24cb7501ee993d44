use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;
use crate::observability::audit::AuditEvent;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct StoreStats {
    pub blocked_addresses: usize,
    pub tracked_addresses: usize,
    pub rate_windows: usize,
    pub otp_records: usize,
}

#[derive(Serialize)]
pub struct AmnestyResult {
    pub released: usize,
}

#[derive(Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

const DEFAULT_AUDIT_LIMIT: usize = 50;

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StoreStats> {
    Json(StoreStats {
        blocked_addresses: state.tracker.blocked_count(),
        tracked_addresses: state.tracker.tracked_count(),
        rate_windows: state.limiter.len(),
        otp_records: state.otp.len(),
    })
}

pub async fn get_blocked(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.tracker.blocked_addresses())
}

/// Release every block and forget every record now, whatever the amnesty mode.
pub async fn post_amnesty(State(state): State<AppState>) -> Json<AmnestyResult> {
    let released = state.tracker.clear();
    tracing::info!(released, "Manual amnesty");
    Json(AmnestyResult { released })
}

pub async fn delete_rate_limit(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> StatusCode {
    if state.limiter.clear(&identifier) {
        tracing::info!(identifier = %identifier, "Rate limit window cleared");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn get_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Json<Vec<AuditEvent>> {
    Json(state.audit.recent(query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT)))
}
