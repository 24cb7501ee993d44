//! Operator API on its own listener, guarded by a bearer key.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/stats", get(get_stats))
        .route("/admin/blocked", get(get_blocked))
        .route("/admin/amnesty", post(post_amnesty))
        .route("/admin/rate-limits/{identifier}", delete(delete_rate_limit))
        .route("/admin/audit", get(get_audit))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
