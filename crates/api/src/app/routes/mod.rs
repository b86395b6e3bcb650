use axum::Router;

pub mod movements;
pub mod products;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/movements", movements::router())
        .nest("/products", products::router())
}
