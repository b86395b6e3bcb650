use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, TenantContext};

pub fn router() -> Router {
    Router::new().route("/", get(list_movements).post(record_movement))
}

pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(actor): Extension<ActorContext>,
    body: Result<Json<dto::RecordMovementRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let command = match body.into_command() {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match services
        .record_movement(tenant.tenant_id(), actor.actor_id(), command)
        .await
    {
        Ok(recorded) => (StatusCode::CREATED, Json(recorded)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::ListMovementsQuery>,
) -> axum::response::Response {
    let filter = match query.filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let pagination = services.pagination(query.limit, query.offset);

    match services.list_movements(tenant.tenant_id(), filter, pagination).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
