//! Checkout and order tracking routes.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use restwell_core::{Actor, Order, OrderId};

use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath};
use crate::services::CheckoutRequest;
use crate::state::AppState;

/// Optional body of a cancellation request.
#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

impl CancelRequest {
    /// Parse an optional JSON body; an empty body means no reason.
    pub(crate) fn from_body(body: &Bytes) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| AppError::BadRequest(e.to_string()))
    }
}

/// Routes that create orders (rate limited more tightly).
pub fn checkout_router() -> Router<AppState> {
    Router::new().route("/orders", post(create))
}

/// Order tracking routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders/{id}", get(show))
        .route("/orders/{id}/cancel", post(cancel))
}

/// POST /api/orders
#[instrument(skip(state, request))]
async fn create(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = state.orders().create(request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/orders/{id}
#[instrument(skip(state))]
async fn show(State(state): State<AppState>, ApiPath(id): ApiPath<OrderId>) -> Result<Json<Order>> {
    Ok(Json(state.orders().get(id).await?))
}

/// POST /api/orders/{id}/cancel
#[instrument(skip(state, body))]
async fn cancel(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<OrderId>,
    body: Bytes,
) -> Result<Json<Order>> {
    let request = CancelRequest::from_body(&body)?;
    let order = state
        .orders()
        .cancel(id, Actor::Customer, request.reason)
        .await?;
    Ok(Json(order))
}
