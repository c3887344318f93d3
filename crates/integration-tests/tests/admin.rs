//! Admin back office: session gating and order management.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use axum::http::{Method, StatusCode, header};
use serde_json::json;

use restwell_integration_tests::{ADMIN_USERNAME, TestApp, signed_callback};

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_admin_routes_require_session() {
    let app = TestApp::new();

    for uri in [
        "/api/admin/dashboard",
        "/api/admin/orders",
        "/api/admin/products",
        "/api/admin/customers",
    ] {
        let response = app.get(uri, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(response.json()["error"], "unauthorized", "{uri}");
    }

    let response = app
        .get("/api/admin/dashboard", Some("admin_session=forged"))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let app = TestApp::new();
    let response = app
        .json(
            Method::POST,
            "/api/admin/login",
            &json!({ "username": ADMIN_USERNAME, "password": "wrong-password-123" }),
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.session_cookie().is_none());
}

#[tokio::test]
async fn test_login_session_and_logout() {
    let app = TestApp::new();

    let login = app
        .json(
            Method::POST,
            "/api/admin/login",
            &json!({ "username": ADMIN_USERNAME, "password": restwell_integration_tests::ADMIN_PASSWORD }),
            None,
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.json()["authenticated"], true);
    let set_cookie = login
        .headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_ascii_lowercase();
    assert!(set_cookie.contains("httponly"));
    assert!(set_cookie.contains("path=/api/admin"));

    let cookie = login.session_cookie().unwrap();
    let session = app.get("/api/admin/session", Some(&cookie)).await.json();
    assert_eq!(session["authenticated"], true);
    assert_eq!(session["username"], ADMIN_USERNAME);

    let dashboard = app.get("/api/admin/dashboard", Some(&cookie)).await;
    assert_eq!(dashboard.status, StatusCode::OK);
    assert_eq!(dashboard.json()["productCount"], 0);

    let logout = app
        .send(
            axum::http::Request::builder()
                .method(Method::POST)
                .uri("/api/admin/logout")
                .header(header::COOKIE, &cookie)
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);

    let after = app.get("/api/admin/dashboard", Some(&cookie)).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Products
// ============================================================================

#[tokio::test]
async fn test_admin_product_crud() {
    let app = TestApp::new();
    let cookie = app.login().await;

    let created = app
        .json(
            Method::POST,
            "/api/admin/products",
            &json!({
                "name": "Latex Topper",
                "category": "toppers",
                "price": "5999.00",
                "sizes": ["Queen 78x60"]
            }),
            Some(&cookie),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let product = created.json();
    assert_eq!(product["slug"], "latex-topper");
    let id = product["id"].as_str().unwrap();

    let public = app.get("/api/products/latex-topper", None).await;
    assert_eq!(public.status, StatusCode::OK);

    let updated = app
        .json(
            Method::PUT,
            &format!("/api/admin/products/{id}"),
            &json!({
                "name": "Latex Topper",
                "category": "toppers",
                "price": "5499.00",
                "active": false
            }),
            Some(&cookie),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.json()["active"], false);

    // Inactive products disappear from the storefront.
    let hidden = app.get("/api/products/latex-topper", None).await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);

    let invalid = app
        .json(
            Method::POST,
            "/api/admin/products",
            &json!({ "name": " ", "category": "toppers", "price": "10.00" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

    let deleted = app
        .send(
            axum::http::Request::builder()
                .method(Method::DELETE)
                .uri(format!("/api/admin/products/{id}"))
                .header(header::COOKIE, &cookie)
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let gone = app
        .get(&format!("/api/admin/products/{id}"), Some(&cookie))
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Orders
// ============================================================================

#[tokio::test]
async fn test_admin_moves_paid_order_through_fulfilment() {
    let app = TestApp::new();
    let product = app.seed_product("Cloud Pillow", 149_900, &[]).await;
    let id = app.checkout(&product, None).await["id"]
        .as_str()
        .unwrap()
        .to_owned();
    let txn = app.initiate(&id).await;
    let (x_verify, body) = signed_callback(&txn, "PAYMENT_SUCCESS", "COMPLETED", 149_900);
    app.callback(&x_verify, &body).await;

    let cookie = app.login().await;
    let status_uri = format!("/api/admin/orders/{id}/status");

    // Skipping straight to delivered is not allowed.
    let response = app
        .json(
            Method::PATCH,
            &status_uri,
            &json!({ "status": "DELIVERED" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    for status in ["PROCESSING", "SHIPPED", "DELIVERED"] {
        let response = app
            .json(
                Method::PATCH,
                &status_uri,
                &json!({ "status": status, "note": format!("moved to {status}") }),
                Some(&cookie),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{status}");
        assert_eq!(response.json()["status"], status);
    }

    // Delivered is terminal.
    let response = app
        .json(
            Method::POST,
            &format!("/api/admin/orders/{id}/cancel"),
            &json!({ "reason": "too late" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let listed = app
        .get("/api/admin/orders?status=delivered", Some(&cookie))
        .await
        .json();
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["items"][0]["id"], id.as_str());
}

#[tokio::test]
async fn test_admin_cannot_confirm_unpaid_order_but_can_mark_paid() {
    let app = TestApp::new();
    let product = app.seed_product("Cloud Pillow", 149_900, &[]).await;
    let id = app.checkout(&product, None).await["id"]
        .as_str()
        .unwrap()
        .to_owned();
    let cookie = app.login().await;

    let response = app
        .json(
            Method::PATCH,
            &format!("/api/admin/orders/{id}/status"),
            &json!({ "status": "CONFIRMED" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let response = app
        .json(
            Method::POST,
            &format!("/api/admin/orders/{id}/mark-paid"),
            &json!({ "reference": "NEFT 8812" }),
            Some(&cookie),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let order = response.json();
    assert_eq!(order["status"], "CONFIRMED");
    assert_eq!(order["payment"]["status"], "COMPLETED");

    // Marking twice is a conflict-free no-op.
    let again = app
        .json(
            Method::POST,
            &format!("/api/admin/orders/{id}/mark-paid"),
            &json!({}),
            Some(&cookie),
        )
        .await;
    assert_eq!(again.status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_customers_are_recorded_on_checkout() {
    let app = TestApp::new();
    let product = app.seed_product("Cloud Pillow", 149_900, &[]).await;
    app.checkout(&product, None).await;
    app.checkout(&product, None).await;
    let cookie = app.login().await;

    let customers = app.get("/api/admin/customers", Some(&cookie)).await.json();
    assert_eq!(customers["total"], 1);
    let customer = &customers["items"][0];
    assert_eq!(customer["email"], "asha.rao@example.in");

    let id = customer["id"].as_str().unwrap();
    let detail = app
        .get(&format!("/api/admin/customers/{id}"), Some(&cookie))
        .await
        .json();
    assert_eq!(detail["orders"].as_array().unwrap().len(), 2);
}
