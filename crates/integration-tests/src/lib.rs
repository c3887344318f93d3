//! Integration tests for the Restwell storefront API.
//!
//! The full router (middleware, sessions, services) is driven in-process via
//! `tower::ServiceExt::oneshot` against the in-memory store. No database or
//! network is needed; PhonePe is replaced by [`FakeGateway`], which still
//! verifies callback checksums with the real client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p restwell-integration-tests
//! ```

#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

use restwell_core::{Money, NewProduct, PaymentOutcome, Product, ShippingPolicy};
use restwell_storefront::config::{
    AdminCredentials, PhonePeConfig, PhonePeEnvironment, StorefrontConfig,
};
use restwell_storefront::db::{MemoryStore, ProductRepository};
use restwell_storefront::phonepe::{
    CallbackBody, GatewayStatus, PaymentGateway, PaymentRequest, PaymentSession, PhonePeClient,
    PhonePeError, signature,
};
use restwell_storefront::{AppState, Repositories, app};

pub const MERCHANT_ID: &str = "RESTWELLTEST";
pub const SALT_KEY: &str = "5f3a9c1e-7b2d-4e8f-a6c0-d91b4e2f7a35";
pub const SALT_INDEX: u32 = 1;
pub const ADMIN_USERNAME: &str = "ops";
pub const ADMIN_PASSWORD: &str = "k7#Vq9!mZ2@pL4wX";

/// Configuration for in-process tests: plain HTTP, no rate limiting.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    let base_url = "http://shop.restwell.test".to_owned();
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused/restwell_test"),
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 3000,
        admin: AdminCredentials {
            username: ADMIN_USERNAME.to_owned(),
            password: SecretString::from(ADMIN_PASSWORD),
        },
        phonepe: PhonePeConfig {
            merchant_id: MERCHANT_ID.to_owned(),
            salt_key: SecretString::from(SALT_KEY),
            salt_index: SALT_INDEX,
            environment: PhonePeEnvironment::Sandbox,
            api_base_url: "http://127.0.0.1:9".to_owned(),
            redirect_url: format!("{base_url}/checkout/result"),
            callback_url: format!("{base_url}/api/payments/callback"),
        },
        base_url,
        shipping: ShippingPolicy::default(),
        rate_limit_enabled: false,
        cors_allowed_origins: vec![],
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 0.0,
        sentry_traces_sample_rate: 0.0,
    }
}

// ============================================================================
// Fake gateway
// ============================================================================

/// PhonePe stand-in.
///
/// `initiate` always succeeds, `check_status` answers from a script
/// (`PAYMENT_PENDING` by default), and `verify_callback` is the real
/// checksum verification.
pub struct FakeGateway {
    verifier: PhonePeClient,
    statuses: Mutex<HashMap<String, GatewayStatus>>,
    initiated: Mutex<Vec<PaymentRequest>>,
}

impl FakeGateway {
    #[must_use]
    pub fn new(config: &PhonePeConfig) -> Self {
        Self {
            verifier: PhonePeClient::new(config).expect("client builds"),
            statuses: Mutex::new(HashMap::new()),
            initiated: Mutex::new(Vec::new()),
        }
    }

    /// Make `check_status` report `outcome` for `merchant_transaction_id`.
    pub fn script_status(
        &self,
        merchant_transaction_id: &str,
        outcome: PaymentOutcome,
        amount_paise: Option<i64>,
    ) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                merchant_transaction_id.to_owned(),
                GatewayStatus {
                    merchant_transaction_id: merchant_transaction_id.to_owned(),
                    outcome,
                    amount_paise,
                },
            );
    }

    /// Every payment request sent so far.
    #[must_use]
    pub fn initiated(&self) -> Vec<PaymentRequest> {
        self.initiated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentSession, PhonePeError> {
        self.initiated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        Ok(PaymentSession {
            redirect_url: format!(
                "https://mercury-uat.phonepe.test/transact/{}",
                request.merchant_transaction_id
            ),
        })
    }

    async fn check_status(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<GatewayStatus, PhonePeError> {
        let scripted = self
            .statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(merchant_transaction_id)
            .cloned();
        Ok(scripted.unwrap_or_else(|| GatewayStatus {
            merchant_transaction_id: merchant_transaction_id.to_owned(),
            outcome: PaymentOutcome::Pending {
                code: "PAYMENT_PENDING".to_owned(),
            },
            amount_paise: None,
        }))
    }

    fn verify_callback(
        &self,
        x_verify: &str,
        body: &CallbackBody,
    ) -> Result<GatewayStatus, PhonePeError> {
        self.verifier.verify_callback(x_verify, body)
    }
}

/// A callback body as PhonePe would send it, with its `X-VERIFY` header.
#[must_use]
pub fn signed_callback(
    merchant_transaction_id: &str,
    code: &str,
    state: &str,
    amount_paise: i64,
) -> (String, Value) {
    let payload = json!({
        "success": code == "PAYMENT_SUCCESS",
        "code": code,
        "message": "Callback from test",
        "data": {
            "merchantId": MERCHANT_ID,
            "merchantTransactionId": merchant_transaction_id,
            "transactionId": format!("TPG{merchant_transaction_id}"),
            "amount": amount_paise,
            "state": state,
            "responseCode": "SUCCESS",
        }
    });
    let response = STANDARD.encode(payload.to_string());
    let x_verify = signature::x_verify(&response, SALT_KEY, SALT_INDEX);
    (x_verify, json!({ "response": response }))
}

// ============================================================================
// Test app
// ============================================================================

/// A fully wired router over fresh in-memory state.
pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub gateway: Arc<FakeGateway>,
}

/// A buffered response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// Parse the body as JSON.
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("body is not valid JSON")
    }

    /// The `admin_session` cookie set by this response, as `name=value`.
    #[must_use]
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("admin_session="))
            .and_then(|v| v.split(';').next())
            .map(str::to_owned)
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        let config = test_config();
        let store = MemoryStore::new();
        let gateway = Arc::new(FakeGateway::new(&config.phonepe));
        let state = AppState::from_parts(
            config,
            Repositories::memory(&store),
            Arc::clone(&gateway) as Arc<dyn PaymentGateway>,
            None,
        );
        let router = app(state, tower_sessions::MemoryStore::default());
        Self {
            router,
            store,
            gateway,
        }
    }

    /// Drive the router with a single request.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("body collect failed")
            .to_bytes();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.send(build(Method::GET, uri, cookie, &[], None)).await
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        body: &Value,
        cookie: Option<&str>,
    ) -> TestResponse {
        self.send(build(method, uri, cookie, &[], Some(body))).await
    }

    /// POST a callback with an explicit `X-VERIFY` header.
    pub async fn callback(&self, x_verify: &str, body: &Value) -> TestResponse {
        self.send(build(
            Method::POST,
            "/api/payments/callback",
            None,
            &[("x-verify", x_verify)],
            Some(body),
        ))
        .await
    }

    /// Log in as the configured admin and return the session cookie.
    pub async fn login(&self) -> String {
        let response = self
            .json(
                Method::POST,
                "/api/admin/login",
                &json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD }),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed");
        response.session_cookie().expect("login sets a cookie")
    }

    /// Put a product in the catalog.
    pub async fn seed_product(&self, name: &str, price_paise: i64, sizes: &[&str]) -> Product {
        let product = NewProduct {
            name: name.to_owned(),
            slug: None,
            description: String::new(),
            category: "mattresses".to_owned(),
            price: Money::from_paise(price_paise).expect("valid price"),
            compare_at_price: None,
            images: vec![],
            sizes: sizes.iter().map(|s| (*s).to_owned()).collect(),
            in_stock: true,
            featured: false,
            active: true,
        }
        .into_product(Utc::now())
        .expect("valid product");
        self.store.insert(&product).await.expect("insert product");
        product
    }

    /// Check out one unit of `product` and return the order JSON.
    pub async fn checkout(&self, product: &Product, size: Option<&str>) -> Value {
        let response = self
            .json(
                Method::POST,
                "/api/orders",
                &checkout_body(&product.id.to_string(), size, 1),
                None,
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "checkout failed: {:?}",
            response.json()
        );
        response.json()
    }

    /// Start a payment for `order_id` and return the merchant transaction id.
    pub async fn initiate(&self, order_id: &str) -> String {
        let response = self
            .json(
                Method::POST,
                "/api/payments/initiate",
                &json!({ "orderId": order_id }),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "initiate failed");
        response.json()["merchantTransactionId"]
            .as_str()
            .expect("transaction id")
            .to_owned()
    }
}

/// A valid checkout payload for `quantity` units of one product.
#[must_use]
pub fn checkout_body(product_id: &str, size: Option<&str>, quantity: u32) -> Value {
    json!({
        "customer": {
            "name": "Asha Rao",
            "email": "asha.rao@example.in",
            "phone": "9876543210"
        },
        "items": [{ "productId": product_id, "size": size, "quantity": quantity }],
        "shippingAddress": {
            "fullName": "Asha Rao",
            "line1": "12 MG Road",
            "city": "Bengaluru",
            "state": "Karnataka",
            "postalCode": "560001",
            "phone": "9876543210"
        }
    })
}

fn build(
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    extra_headers: &[(&str, &str)],
    body: Option<&Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    for (name, value) in extra_headers {
        builder = builder.header(*name, *value);
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).expect("valid request")
}
