//! "Request a new product" form submissions.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::http::request::ClientInfo;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::audit::{AuditEvent, AuditStatus};
use crate::security::gate::Screened;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProductRequest {
    pub name: String,
    pub contact: String,
    pub product: String,
    #[serde(default)]
    pub article: Option<String>,
}

impl ProductRequest {
    fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.contact.is_empty() && !self.product.is_empty()
    }
}

/// `POST /api/request`
pub async fn submit_product_request(
    State(state): State<AppState>,
    client: ClientInfo,
    request: Screened<ProductRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = request.into_inner();
    if !request.is_complete() {
        return Err(ApiError::BadRequest(
            "Name, contact and product are required".into(),
        ));
    }

    tracing::info!(client = %client.address, product = %request.product, "Product request received");
    state.audit.record(
        AuditEvent::new(
            "product_request",
            "requests",
            client.address,
            client.user_agent,
            AuditStatus::Success,
        )
        .with_details(json!({
            "name": request.name,
            "contact": request.contact,
            "product": request.product,
            "article": request.article.as_deref().unwrap_or("not specified"),
        })),
    );

    Ok(Json(json!({ "success": true })))
}
