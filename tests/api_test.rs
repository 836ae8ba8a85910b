//! HTTP surface tests driving the router with `oneshot`.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use chhapai_orders::handlers::webhooks::{sign_payload, SIGNATURE_HEADER};
use common::{response_json, TestApp};
use serde_json::{json, Value};

fn manual_order(order_no: &str) -> Value {
    json!({
        "order_no": order_no,
        "customer_name": "Asha Traders",
        "product_name": "Flyers",
        "quantity": 1000,
        "price_per_unit": "0.80",
        "priority": "express"
    })
}

fn woo_payload(id: i64) -> Value {
    json!({
        "id": id,
        "billing": { "first_name": "Ravi", "last_name": "Kumar", "email": "ravi@example.com" },
        "shipping": { "address_1": "4 Lake View", "city": "Bengaluru" },
        "line_items": [{ "name": "Letterheads", "sku": "LH-A4", "quantity": 200, "price": "4.25" }],
        "total": "850.00",
        "customer_note": ""
    })
}

async fn create_order(app: &TestApp, order_no: &str) -> String {
    let response = app
        .request_as("sales", Method::POST, "/api/v1/orders", Some(manual_order(order_no)))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_and_metrics_are_public() {
    let app = TestApp::new().await;

    let response = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"], "up");

    let response = app
        .send(Request::get("/metrics").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn requests_without_role_are_unauthorized() {
    let app = TestApp::new().await;
    let response = app
        .send(Request::get("/api/v1/orders").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = response_json(response).await;
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn roles_gate_mutations() {
    let app = TestApp::new().await;

    let response = app
        .request_as("viewer", Method::POST, "/api/v1/orders", Some(manual_order("CH-ORD-300")))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request_as(
            "production",
            Method::POST,
            "/api/v1/stage-catalog",
            Some(json!({ "stage_name": "Foiling" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn order_flows_through_the_api() {
    let app = TestApp::new().await;
    let order_id = create_order(&app, "CH-ORD-301").await;

    // blank delivery date is treated as missing
    let response = app
        .request_as(
            "production",
            Method::POST,
            &format!("/api/v1/orders/{order_id}/schedule"),
            Some(json!({ "delivery_date": "", "stage_names": ["Printing"] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(
        body["message"],
        "Validation error: Please set a delivery date before moving to In-Progress"
    );

    let response = app
        .request_as(
            "production",
            Method::POST,
            &format!("/api/v1/orders/{order_id}/schedule"),
            Some(json!({ "delivery_date": "2024-02-01", "stage_names": ["Printing", "Packaging"] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["order"]["status"], "in_progress");
    assert_eq!(body["data"]["job_card"]["document_id"], "JC-CH-ORD-301");
    let stages = body["data"]["order"]["stages"].as_array().unwrap().clone();
    assert_eq!(stages.len(), 2);

    let response = app
        .request_as(
            "dispatch",
            Method::POST,
            &format!("/api/v1/orders/{order_id}/complete"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    for stage in &stages {
        let response = app
            .request_as(
                "qc",
                Method::POST,
                &format!("/api/v1/stages/{}/toggle", stage["id"].as_str().unwrap()),
                Some(json!({ "current_status": "pending" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["data"]["status"], "completed");
    }

    let response = app
        .request_as(
            "viewer",
            Method::GET,
            &format!("/api/v1/orders/{order_id}/progress"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["progress"]["percentage"], 100);
    assert_eq!(body["data"]["estimate"]["open_stages"], 0);

    let response = app
        .request_as(
            "dispatch",
            Method::POST,
            &format!("/api/v1/orders/{order_id}/complete"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["order"]["status"], "completed");
    assert_eq!(
        body["data"]["delivery_challan"]["document_id"],
        "CH/DC/CH-ORD-301"
    );

    let response = app
        .request_as("viewer", Method::GET, "/api/v1/orders?status=completed", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let response = app
        .request_as("viewer", Method::GET, "/api/v1/orders/stats", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["by_status"]["completed"], 1);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let response = app
        .request_as(
            "viewer",
            Method::GET,
            &format!("/api/v1/orders/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn catalog_is_managed_by_admins() {
    let app = TestApp::new().await;

    let response = app
        .request_as(
            "admin",
            Method::POST,
            "/api/v1/stage-catalog",
            Some(json!({ "stage_name": "Foiling", "department": "production", "estimated_hours": "2" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let stage_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request_as(
            "admin",
            Method::POST,
            &format!("/api/v1/stage-catalog/{stage_id}/move"),
            Some(json!({ "direction": "up" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["stage_name"].as_str().unwrap())
        .collect();
    assert_eq!(names[5], "Foiling");
    assert_eq!(names[6], "Packaging");

    let response = app
        .request_as(
            "admin",
            Method::POST,
            &format!("/api/v1/stage-catalog/{stage_id}/toggle"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request_as("designer", Method::GET, "/api/v1/stage-catalog", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn woocommerce_webhook_ingests_once() {
    let app = TestApp::new().await;
    let payload = serde_json::to_vec(&woo_payload(7001)).unwrap();

    let post = |body: Vec<u8>| {
        Request::post("/api/webhook/woocommerce")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    };

    let response = app.send(post(payload.clone())).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["order_no"], "WC-7001");
    assert_eq!(body["data"]["source"], "woocommerce");

    let response = app.send(post(payload)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.send(post(b"{\"id\":7002}".to_vec())).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn woocommerce_webhook_checks_signature_when_configured() {
    let app = TestApp::with_config(|cfg| {
        cfg.woocommerce_webhook_secret = Some("wc-secret".to_string());
    })
    .await;
    let payload = serde_json::to_vec(&woo_payload(7100)).unwrap();

    let unsigned = Request::post("/api/webhook/woocommerce")
        .header("content-type", "application/json")
        .body(Body::from(payload.clone()))
        .unwrap();
    assert_eq!(app.send(unsigned).await.status(), StatusCode::UNAUTHORIZED);

    let signature = sign_payload(&payload, "wc-secret").unwrap();
    let signed = Request::post("/api/webhook/woocommerce")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(payload))
        .unwrap();
    assert_eq!(app.send(signed).await.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn woocommerce_ping_is_acknowledged() {
    let app = TestApp::new().await;
    let ping = Request::post("/api/webhook/woocommerce")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("webhook_id=12"))
        .unwrap();
    let response = app.send(ping).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Webhook registered");
    assert!(body.get("data").is_none());
}
