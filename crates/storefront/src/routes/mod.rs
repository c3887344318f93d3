//! HTTP routes for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                         - Liveness
//! GET  /health/ready                   - Readiness (database)
//!
//! # Catalog
//! GET  /api/products                   - ?category=&featured=&q=
//! GET  /api/products/{slug}
//! GET  /api/categories
//!
//! # Orders
//! POST /api/orders                     - Checkout
//! GET  /api/orders/{id}                - Tracking
//! POST /api/orders/{id}/cancel         - Customer cancellation
//!
//! # Payments (PhonePe)
//! POST /api/payments/initiate
//! GET  /api/payments/status?orderId=
//! POST /api/payments/callback          - Webhook, never rate limited
//!
//! # Admin (admin_session cookie)
//! POST /api/admin/login | /logout,  GET /api/admin/session
//! GET  /api/admin/dashboard
//! /api/admin/products, /api/admin/orders, /api/admin/customers
//! ```

pub mod admin;
pub mod orders;
pub mod payments;
pub mod products;

use std::time::Duration;

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::from_fn,
    response::Response,
    routing::get,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tower_sessions::SessionStore;
use tracing::Span;

use crate::config::StorefrontConfig;
use crate::error::AppError;
use crate::middleware::{
    api_rate_limiter, checkout_rate_limiter, create_session_layer, login_rate_limiter,
    request_id_middleware, security_headers_middleware,
};
use crate::state::AppState;

/// Routes under `/api`.
fn api_routes<S>(config: &StorefrontConfig, session_store: S) -> Router<AppState>
where
    S: SessionStore + Clone,
{
    let mut public = products::router()
        .merge(orders::router())
        .merge(payments::router());
    let mut checkout = orders::checkout_router().merge(payments::checkout_router());
    let mut login = admin::auth::login_router();

    if config.rate_limit_enabled {
        public = public.layer(api_rate_limiter());
        checkout = checkout.layer(checkout_rate_limiter());
        login = login.layer(login_rate_limiter());
    }

    let admin = login
        .merge(admin::router())
        .layer(create_session_layer(session_store, config));

    Router::new()
        .merge(public)
        .merge(checkout)
        .merge(payments::callback_router())
        .nest("/admin", admin)
}

fn cors_layer(config: &StorefrontConfig) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600)),
    )
}

/// Build the complete application router.
///
/// `session_store` backs the admin session (`PostgresStore` in production,
/// `MemoryStore` in tests).
pub fn app<S>(state: AppState, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let config = state.config();

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api", api_routes(config, session_store))
        .fallback(not_found);

    if let Some(cors) = cors_layer(config) {
        router = router.layer(cors);
    }

    router
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        admin = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(|response: &Response, latency: Duration, span: &Span| {
                    span.record("status", response.status().as_u16());
                    span.record(
                        "latency_ms",
                        u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    );
                    DefaultOnResponse::default().on_response(response, latency, span);
                }),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    let Some(pool) = state.pool() else {
        return StatusCode::OK;
    };
    match sqlx::query("SELECT 1").fetch_one(pool).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn not_found() -> AppError {
    AppError::NotFound("no such route".to_owned())
}
