//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use common::UserId;
use fulfillment::webhook::SIGNATURE_HEADER;
use fulfillment::{Backends, FulfillmentSettings, FulfillmentSystem, WebhookVerifier};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_api_test";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn verifier() -> WebhookVerifier {
    WebhookVerifier::new(WEBHOOK_SECRET, chrono::Duration::minutes(5))
}

struct TestApp {
    app: Router,
    admin: UserId,
}

impl TestApp {
    async fn new() -> Self {
        let system = FulfillmentSystem::new(
            Backends::in_memory(),
            FulfillmentSettings::default(),
            verifier(),
        );
        let app = api::create_app(api::AppState::from_system(&system), get_metrics_handle());
        let test_app = Self {
            app,
            admin: UserId::new(),
        };

        test_app.put_product("SKU-BALL", "Ball", 1200, 2).await;
        test_app.put_product("SKU-NET", "Net", 700, 10).await;
        test_app
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        user: Option<UserId>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user.to_string());
            if user == self.admin {
                builder = builder.header("x-user-role", "admin");
            }
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn put_product(&self, id: &str, name: &str, price_cents: i64, amount_left: u32) {
        let (status, _) = self
            .call(
                "PUT",
                &format!("/admin/products/{id}"),
                Some(self.admin),
                Some(json!({
                    "name": name,
                    "priceCents": price_cents,
                    "amountLeft": amount_left,
                    "categories": ["sport"],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    async fn add(&self, user: UserId, product_id: &str) -> (StatusCode, Value) {
        self.call("POST", "/cart/add", Some(user), Some(json!({ "productId": product_id })))
            .await
    }

    async fn checkout(&self, user: UserId) -> (StatusCode, Value) {
        self.call(
            "POST",
            "/payment/create",
            Some(user),
            Some(json!({
                "firstName": "Grace",
                "lastName": "Hopper",
                "shippingAddress": {
                    "address": "1 Compiler Way",
                    "city": "Arlington",
                    "country": "US",
                    "zipCode": "22201"
                },
                "deliveryTime": "EXPRESS",
                "contactEmail": "grace@example.com"
            })),
        )
        .await
    }

    async fn webhook(&self, session_id: &str, signature_secret: &str) -> StatusCode {
        let payload = json!({
            "type": "checkout.session.completed",
            "data": { "object": { "id": session_id } }
        })
        .to_string();
        let signature = WebhookVerifier::new(signature_secret, chrono::Duration::minutes(5))
            .sign(payload.as_bytes(), Utc::now().timestamp())
            .unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/payment/webhook")
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(payload))
            .unwrap();
        self.send(request).await.0
    }

    async fn stock(&self, product_id: &str) -> u64 {
        let (_, product) = self
            .call("GET", &format!("/products/{product_id}"), None, None)
            .await;
        product["amountLeft"].as_u64().unwrap()
    }
}

#[tokio::test]
async fn test_health_check() {
    let t = TestApp::new().await;
    let (status, json) = t.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = TestApp::new().await;
    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cart_requires_identity() {
    let t = TestApp::new().await;
    let (status, json) = t.call("GET", "/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");

    let request = Request::builder()
        .uri("/cart")
        .header("x-user-id", "not-a-uuid")
        .body(Body::empty())
        .unwrap();
    assert_eq!(t.send(request).await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_add_to_cart_until_out_of_stock() {
    let t = TestApp::new().await;
    let user = UserId::new();

    assert_eq!(t.add(user, "SKU-BALL").await.1["quantity"], 1);
    assert_eq!(t.add(user, "SKU-BALL").await.1["quantity"], 2);
    let (status, json) = t.add(user, "SKU-BALL").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "OUT_OF_STOCK");

    let (status, json) = t.add(user, "SKU-MISSING").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "PRODUCT_NOT_FOUND");

    let (_, cart) = t.call("GET", "/cart", Some(user), None).await;
    assert_eq!(cart["total"], 2400);
    assert_eq!(cart["locked"], false);
}

#[tokio::test]
async fn test_cart_line_removal() {
    let t = TestApp::new().await;
    let user = UserId::new();
    t.add(user, "SKU-NET").await;
    t.add(user, "SKU-NET").await;
    t.add(user, "SKU-BALL").await;

    let (status, json) = t
        .call("POST", "/cart/remove", Some(user), Some(json!({ "productId": "SKU-NET" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["quantity"], 1);

    let (status, _) = t.call("DELETE", "/cart/SKU-BALL", Some(user), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = t.call("GET", "/cart/valid", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], true);

    let (status, _) = t.call("DELETE", "/cart", Some(user), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, json) = t.call("GET", "/cart/valid", Some(user), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "EMPTY_CART");
}

#[tokio::test]
async fn test_summary_reserves_and_locks_cart() {
    let t = TestApp::new().await;
    let user = UserId::new();
    t.add(user, "SKU-BALL").await;
    t.add(user, "SKU-BALL").await;

    let (status, summary) = t.call("GET", "/payment/summary", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["cart"]["locked"], true);
    assert_eq!(summary["shippingOptions"].as_array().unwrap().len(), 2);
    assert_eq!(t.stock("SKU-BALL").await, 0);

    let (status, json) = t.add(user, "SKU-NET").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CART_LOCKED");

    let (status, _) = t.call("DELETE", "/payment/cancel", Some(user), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(t.stock("SKU-BALL").await, 2);
}

#[tokio::test]
async fn test_checkout_webhook_and_order_flow() {
    let t = TestApp::new().await;
    let user = UserId::new();
    t.add(user, "SKU-BALL").await;
    t.add(user, "SKU-NET").await;

    let (status, redirect) = t.checkout(user).await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = redirect["orderId"].as_str().unwrap().to_string();
    let session_id = redirect["sessionId"].as_str().unwrap().to_string();
    assert!(redirect["url"].as_str().unwrap().contains(&session_id));

    let (_, order) = t
        .call("GET", &format!("/orders/{order_id}"), Some(user), None)
        .await;
    assert_eq!(order["status"], "CREATED");
    assert_eq!(order["totalPrice"], 1900);
    assert_eq!(order["shippingPrice"], 1500);

    // Forged signature: acknowledged, nothing changes.
    assert_eq!(t.webhook(&session_id, "whsec_forged").await, StatusCode::OK);
    let (_, order) = t
        .call("GET", &format!("/orders/{order_id}"), Some(user), None)
        .await;
    assert_eq!(order["status"], "CREATED");

    assert_eq!(t.webhook(&session_id, WEBHOOK_SECRET).await, StatusCode::OK);
    assert_eq!(t.webhook(&session_id, WEBHOOK_SECRET).await, StatusCode::OK);
    let (_, order) = t
        .call("GET", &format!("/orders/{order_id}"), Some(user), None)
        .await;
    assert_eq!(order["status"], "PROCESSING");

    let (_, product) = t.call("GET", "/products/SKU-BALL", None, None).await;
    assert_eq!(product["ordersSold"], 1);

    let (status, json) = t
        .call("POST", &format!("/orders/{order_id}/refund"), Some(user), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "INVALID_ORDER_STATE");

    let (_, orders) = t.call("GET", "/orders", Some(user), None).await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_order_restocks() {
    let t = TestApp::new().await;
    let user = UserId::new();
    t.add(user, "SKU-BALL").await;
    t.add(user, "SKU-BALL").await;
    let (_, redirect) = t.checkout(user).await;
    let order_id = redirect["orderId"].as_str().unwrap().to_string();
    assert_eq!(t.stock("SKU-BALL").await, 0);

    let stranger = UserId::new();
    let (status, _) = t
        .call("POST", &format!("/orders/{order_id}/cancel"), Some(stranger), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, order) = t
        .call("POST", &format!("/orders/{order_id}/cancel"), Some(user), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "ANNULLED");
    assert_eq!(t.stock("SKU-BALL").await, 2);

    let (status, _) = t
        .call("POST", &format!("/orders/{order_id}/cancel"), Some(user), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_admin_endpoints_require_admin() {
    let t = TestApp::new().await;
    let user = UserId::new();

    let (status, json) = t.call("GET", "/admin/orders", Some(user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");

    let (status, _) = t
        .call(
            "PUT",
            "/admin/products/SKU-NET/stock",
            Some(user),
            Some(json!({ "amount": 99 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_lists_and_filters_orders() {
    let t = TestApp::new().await;
    let user = UserId::new();
    t.add(user, "SKU-NET").await;
    let (_, redirect) = t.checkout(user).await;
    let order_id = redirect["orderId"].as_str().unwrap().to_string();

    let (status, page) = t
        .call("GET", "/admin/orders?status=created&size=5", Some(t.admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["size"], 5);

    let (status, json) = t
        .call("GET", "/admin/orders?status=lost", Some(t.admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");

    let (status, order) = t
        .call("POST", &format!("/admin/orders/{order_id}/cancel"), Some(t.admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "ANNULLED");
}

#[tokio::test]
async fn test_admin_sets_stock_and_related_products() {
    let t = TestApp::new().await;

    let (status, json) = t
        .call(
            "PUT",
            "/admin/products/SKU-NET/stock",
            Some(t.admin),
            Some(json!({ "amount": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["amountLeft"], 3);
    assert_eq!(t.stock("SKU-NET").await, 3);

    let (status, related) = t
        .call("GET", "/products/SKU-BALL/related", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = related
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["SKU-NET"]);
}

#[tokio::test]
async fn test_webhook_without_signature_is_acknowledged() {
    let t = TestApp::new().await;
    let request = Request::builder()
        .method("POST")
        .uri("/payment/webhook")
        .body(Body::from("{}"))
        .unwrap();
    let (status, json) = t.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["received"], true);
}
