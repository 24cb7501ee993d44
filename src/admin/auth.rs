use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::request::{client_address, user_agent};
use crate::http::server::AppState;
use crate::observability::audit::SecurityEventKind;

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let address = client_address(request.headers(), request.extensions());
    let path = request.uri().path().to_string();
    let agent = user_agent(request.headers()).to_string();

    if presented.is_some_and(|key| key == &*state.admin_key) {
        state.audit.log_security_event(
            SecurityEventKind::AdminAccess,
            None,
            &address,
            &agent,
            serde_json::json!({ "path": path }),
        );
        return Ok(next.run(request).await);
    }

    tracing::warn!(client = %address, path = %path, "Rejected admin API request");
    state.audit.log_security_event(
        SecurityEventKind::FailedAuth,
        None,
        &address,
        &agent,
        serde_json::json!({ "path": path, "surface": "admin" }),
    );
    Err(StatusCode::UNAUTHORIZED)
}
