//! Response shapes produced by the perimeter itself.
//!
//! Edge blocks are deliberately minimal plain text. Everything an API handler
//! rejects is a JSON `{"error": "..."}` body.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;

/// Why the edge filter stopped a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Address is in the blocked set.
    Blocked,
    /// Automated user agent on a non-API path.
    Bot,
    /// Path traversal sequence in the request path.
    Traversal,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::Blocked => "blocked_address",
            BlockReason::Bot => "bot_detected",
            BlockReason::Traversal => "path_traversal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            BlockReason::Blocked | BlockReason::Bot => StatusCode::FORBIDDEN,
            BlockReason::Traversal => StatusCode::BAD_REQUEST,
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            BlockReason::Blocked => "Access Denied",
            BlockReason::Bot => "Forbidden",
            BlockReason::Traversal => "Invalid Path",
        }
    }
}

impl IntoResponse for BlockReason {
    fn into_response(self) -> Response {
        let mut res = (self.status(), self.body()).into_response();
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        res
    }
}

/// Redirect for unauthenticated admin page requests.
pub fn login_redirect(login_path: &str) -> Response {
    Redirect::to(login_path).into_response()
}

/// Errors returned by API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Too many requests. Please try again later.")]
    RateLimited,

    #[error("{0}")]
    BadRequest(String),

    /// The input gate refused the submission. The reason is never echoed.
    #[error("Invalid input detected")]
    InputRejected,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Upstream request failed")]
    BadGateway,

    #[error("Not found")]
    NotFound,

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadRequest(_) | ApiError::InputRejected => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadGateway => StatusCode::BAD_GATEWAY,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
