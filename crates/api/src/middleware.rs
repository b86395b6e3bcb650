use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use stockledger_core::{ActorId, TenantId};

use crate::app::errors::json_error;
use crate::context::{ActorContext, TenantContext};

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Turn the identity layer's headers into request contexts.
///
/// A missing or malformed tenant is 401; a malformed actor is 400.
pub async fn context_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let tenant_id: TenantId = header_value(req.headers(), TENANT_HEADER)
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "unauthorized", "missing tenant context"))?
        .parse()
        .map_err(|_| json_error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid tenant id"))?;

    let actor_id = match header_value(req.headers(), ACTOR_HEADER) {
        Some(raw) => Some(
            raw.parse::<ActorId>()
                .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid actor id"))?,
        ),
        None => None,
    };

    req.extensions_mut().insert(TenantContext::new(tenant_id));
    req.extensions_mut().insert(ActorContext::new(actor_id));

    Ok(next.run(req).await)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    if value.is_empty() { None } else { Some(value) }
}
