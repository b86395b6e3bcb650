use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use stockledger_core::ProductId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/:id/stock", get(get_stock))
        .route("/:id/audit", get(audit_stock))
}

pub async fn get_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match dto::parse_id("product id", &id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.stock_snapshot(tenant.tenant_id(), product_id).await {
        Ok(snapshot) => (StatusCode::OK, Json(dto::stock_to_json(product_id, snapshot))).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Replays the product's history against the stored aggregates. Never repairs.
pub async fn audit_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match dto::parse_id("product id", &id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.audit(tenant.tenant_id(), product_id).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
