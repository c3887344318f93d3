//! Catalog reads and the cross-cutting HTTP behaviour (health, errors,
//! security headers, request ids).

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use axum::body::Body;
use axum::http::{Request, StatusCode, header};

use restwell_integration_tests::TestApp;

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();

    let live = app.get("/health", None).await;
    assert_eq!(live.status, StatusCode::OK);
    assert_eq!(&live.body[..], b"ok");

    // No database pool in tests, so readiness is unconditional.
    let ready = app.get("/health/ready", None).await;
    assert_eq!(ready.status, StatusCode::OK);
}

#[tokio::test]
async fn test_product_listing_and_filters() {
    let app = TestApp::new();
    app.seed_product("Ortho Memory Foam", 1_899_900, &["Queen 78x60"])
        .await;
    app.seed_product("Pocket Spring Hybrid", 2_749_900, &[]).await;

    let all = app.get("/api/products", None).await;
    assert_eq!(all.status, StatusCode::OK);
    let all = all.json();
    assert_eq!(all["count"], 2);

    let searched = app.get("/api/products?q=spring", None).await.json();
    assert_eq!(searched["count"], 1);
    assert_eq!(searched["products"][0]["slug"], "pocket-spring-hybrid");

    let other = app.get("/api/products?category=pillows", None).await.json();
    assert_eq!(other["count"], 0);

    let categories = app.get("/api/categories", None).await.json();
    assert_eq!(categories["categories"][0]["name"], "mattresses");
    assert_eq!(categories["categories"][0]["productCount"], 2);

    let one = app.get("/api/products/ortho-memory-foam", None).await;
    assert_eq!(one.status, StatusCode::OK);
    assert_eq!(one.json()["sizes"][0], "Queen 78x60");
}

#[tokio::test]
async fn test_errors_are_json() {
    let app = TestApp::new();

    let missing = app.get("/api/products/no-such-bed", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    let body = missing.json();
    assert_eq!(body["error"], "not_found");
    assert!(body["message"].is_string());

    let unrouted = app.get("/api/nowhere", None).await;
    assert_eq!(unrouted.status, StatusCode::NOT_FOUND);
    assert_eq!(unrouted.json()["error"], "not_found");

    let bad_id = app.get("/api/orders/not-a-uuid", None).await;
    assert_eq!(bad_id.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_id.json()["error"], "bad_request");
}

#[tokio::test]
async fn test_security_headers_and_request_id() {
    let app = TestApp::new();

    let response = app.get("/api/products", None).await;
    assert_eq!(response.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(response.headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(response.headers[header::CACHE_CONTROL], "no-store");
    assert!(response.headers.contains_key("x-request-id"));

    let echoed = app
        .send(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "cf-ray-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(echoed.headers["x-request-id"], "cf-ray-42");
}
