use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use stockledger_api::app::{build_app, services::AppServices};
use stockledger_core::{ActorId, ProductId, TenantId};
use stockledger_infra::InMemoryDirectory;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(directory: Arc<InMemoryDirectory>) -> Self {
        // Same router as prod, in-memory backend, ephemeral port.
        let services = Arc::new(AppServices::in_memory(directory, 1000));
        let app = build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Ctx {
    srv: TestServer,
    client: reqwest::Client,
    tenant_id: TenantId,
    product_id: ProductId,
}

async fn setup() -> Ctx {
    let directory = Arc::new(InMemoryDirectory::new());
    let tenant_id = TenantId::new();
    let product_id = ProductId::new();
    directory
        .register_product(tenant_id, product_id, "Widget", Some("pcs".to_string()))
        .unwrap();

    Ctx {
        srv: TestServer::spawn(directory).await,
        client: reqwest::Client::new(),
        tenant_id,
        product_id,
    }
}

impl Ctx {
    async fn post_movement(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}/movements", self.srv.base_url))
            .header("x-tenant-id", self.tenant_id.to_string())
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.srv.base_url, path))
            .header("x-tenant-id", self.tenant_id.to_string())
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn health_needs_no_tenant() {
    let ctx = setup().await;
    let res = ctx
        .client
        .get(format!("{}/health", ctx.srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_header_is_required() {
    let ctx = setup().await;

    let res = ctx
        .client
        .get(format!("{}/movements", ctx.srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = ctx
        .client
        .get(format!("{}/movements", ctx.srv.base_url))
        .header("x-tenant-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn purchase_transfer_sale_lifecycle() {
    let ctx = setup().await;
    let actor = ActorId::new();

    let res = ctx
        .client
        .post(format!("{}/movements", ctx.srv.base_url))
        .header("x-tenant-id", ctx.tenant_id.to_string())
        .header("x-actor-id", actor.to_string())
        .json(&json!({
            "type": "PURCHASE",
            "product_id": ctx.product_id.to_string(),
            "quantity": 10,
            "to_location": "A",
            "cost": "12.50",
            "reference_type": "purchase_order",
            "reference_id": "PO-1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["movement"]["type"], "PURCHASE");
    assert_eq!(body["movement"]["recorded_by"], actor.to_string());
    assert_eq!(body["stock"]["current_stock"], 10);
    assert_eq!(body["stock"]["locations"][0]["location"], "A");
    assert_eq!(body["stock"]["locations"][0]["available_qty"], 10);

    let res = ctx
        .post_movement(json!({
            "type": "TRANSFER",
            "product_id": ctx.product_id.to_string(),
            "quantity": 4,
            "from_location": "A",
            "to_location": "B",
        }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["stock"]["current_stock"], 10);

    let res = ctx
        .post_movement(json!({
            "type": "SALE",
            "product_id": ctx.product_id.to_string(),
            "quantity": 3,
            "from_location": "B",
        }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = ctx.get(&format!("/products/{}/stock", ctx.product_id)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let stock: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stock["current_stock"], 7);
    let locations = stock["locations"].as_array().unwrap();
    assert_eq!(locations.len(), 2);
    assert_eq!(locations[0]["location"], "A");
    assert_eq!(locations[0]["quantity"], 6);
    assert_eq!(locations[1]["location"], "B");
    assert_eq!(locations[1]["quantity"], 1);

    let res = ctx.get(&format!("/products/{}/audit", ctx.product_id)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["consistent"], true);
    assert_eq!(report["movements_replayed"], 3);
}

#[tokio::test]
async fn validation_errors_are_400_and_write_nothing() {
    let ctx = setup().await;

    let cases = [
        json!({ "type": "GIFT", "product_id": ctx.product_id.to_string(), "quantity": 1 }),
        json!({ "type": "PURCHASE", "product_id": ctx.product_id.to_string(), "quantity": 0 }),
        json!({ "type": "PURCHASE", "quantity": 1 }),
        json!({ "type": "PURCHASE", "product_id": "nope", "quantity": 1 }),
        json!({ "type": "TRANSFER", "product_id": ctx.product_id.to_string(), "quantity": 1, "from_location": "A", "to_location": "A" }),
    ];

    for body in cases {
        let res = ctx.post_movement(body.clone()).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{body}");
        let err: serde_json::Value = res.json().await.unwrap();
        assert_eq!(err["error"], "validation_error", "{body}");
    }

    let res = ctx.get("/movements").await;
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn mistyped_quantity_is_a_validation_error() {
    let ctx = setup().await;

    for quantity in [json!(1.5), json!("3"), json!(null)] {
        let res = ctx
            .post_movement(json!({
                "type": "PURCHASE",
                "product_id": ctx.product_id.to_string(),
                "quantity": quantity,
            }))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{quantity}");
        let err: serde_json::Value = res.json().await.unwrap();
        assert_eq!(err["error"], "validation_error", "{quantity}");
        assert!(err["message"].as_str().unwrap().contains("quantity"), "{err}");
    }

    let res = ctx
        .client
        .post(format!("{}/movements", ctx.srv.base_url))
        .header("x-tenant-id", ctx.tenant_id.to_string())
        .header("content-type", "application/json")
        .body("{\"type\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "validation_error");

    let res = ctx.get("/movements").await;
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn oversized_cost_is_a_validation_error() {
    let ctx = setup().await;

    let res = ctx
        .post_movement(json!({
            "type": "PURCHASE",
            "product_id": ctx.product_id.to_string(),
            "quantity": 1,
            "cost": "12345678901.5",
        }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "validation_error");
}

#[tokio::test]
async fn unknown_product_is_404() {
    let ctx = setup().await;

    let res = ctx
        .post_movement(json!({
            "type": "PURCHASE",
            "product_id": ProductId::new().to_string(),
            "quantity": 5,
        }))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "not_found");
}

#[tokio::test]
async fn history_is_paginated_filtered_and_joined() {
    let ctx = setup().await;

    for quantity in 1..=3 {
        let res = ctx
            .post_movement(json!({
                "type": "PURCHASE",
                "product_id": ctx.product_id.to_string(),
                "quantity": quantity,
            }))
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }
    let res = ctx
        .post_movement(json!({
            "type": "DAMAGE",
            "product_id": ctx.product_id.to_string(),
            "quantity": 1,
        }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = ctx.get("/movements?limit=2").await;
    assert_eq!(res.status(), StatusCode::OK);
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 4);
    assert_eq!(page["has_more"], true);
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["type"], "DAMAGE");
    assert_eq!(items[0]["product_name"], "Widget");
    assert_eq!(items[0]["product_unit"], "pcs");

    let res = ctx.get("/movements?limit=2&offset=2").await;
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["has_more"], false);
    assert_eq!(page["items"][1]["quantity"], 1);

    let res = ctx
        .get(&format!("/movements?type=PURCHASE&product_id={}", ctx.product_id))
        .await;
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 3);

    let res = ctx.get("/movements?type=purchase").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tenants_do_not_see_each_other() {
    let ctx = setup().await;

    let res = ctx
        .post_movement(json!({
            "type": "PURCHASE",
            "product_id": ctx.product_id.to_string(),
            "quantity": 5,
        }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let other = TenantId::new();
    let res = ctx
        .client
        .get(format!("{}/movements", ctx.srv.base_url))
        .header("x-tenant-id", other.to_string())
        .send()
        .await
        .unwrap();
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["total"], 0);

    let res = ctx
        .client
        .post(format!("{}/movements", ctx.srv.base_url))
        .header("x-tenant-id", other.to_string())
        .json(&json!({
            "type": "PURCHASE",
            "product_id": ctx.product_id.to_string(),
            "quantity": 5,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
