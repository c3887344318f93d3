//! PhonePe payment routes.
//!
//! ```text
//! POST /api/payments/initiate   {orderId} -> {redirectUrl, merchantTransactionId}
//! GET  /api/payments/status     ?orderId= (polls PhonePe while pending)
//! POST /api/payments/callback   PhonePe server-to-server webhook
//! ```

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use restwell_core::OrderId;

use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiQuery};
use crate::phonepe::{CallbackBody, PhonePeError};
use crate::services::{CallbackDisposition, PaymentInitiation, PaymentStatusView};
use crate::state::AppState;

/// Checksum header sent by PhonePe.
pub const X_VERIFY_HEADER: &str = "x-verify";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub order_id: OrderId,
}

#[derive(Debug, Serialize)]
pub struct CallbackAck {
    pub status: CallbackDisposition,
}

/// Payment initiation (rate limited with checkout).
pub fn checkout_router() -> Router<AppState> {
    Router::new().route("/payments/initiate", post(initiate))
}

/// Status polling.
pub fn router() -> Router<AppState> {
    Router::new().route("/payments/status", get(status))
}

/// Gateway webhook; mounted without rate limiting.
pub fn callback_router() -> Router<AppState> {
    Router::new().route("/payments/callback", post(callback))
}

/// POST /api/payments/initiate
#[instrument(skip(state))]
async fn initiate(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<OrderRef>,
) -> Result<Json<PaymentInitiation>> {
    Ok(Json(state.payments().initiate(body.order_id).await?))
}

/// GET /api/payments/status?orderId=
#[instrument(skip(state))]
async fn status(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<OrderRef>,
) -> Result<Json<PaymentStatusView>> {
    Ok(Json(state.payments().check_status(query.order_id).await?))
}

/// POST /api/payments/callback
///
/// 200 for anything we could authenticate and decode (including duplicates
/// and outcomes we ignore), 401 for a bad checksum, 400 for a malformed
/// body, 500 if the order could not be stored so that PhonePe retries.
#[instrument(skip_all)]
async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<CallbackBody>,
) -> Result<Json<CallbackAck>> {
    let x_verify = headers
        .get(X_VERIFY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Gateway(PhonePeError::InvalidSignature))?;

    let status = state.payments().handle_callback(x_verify, &body).await?;
    tracing::info!(?status, "PhonePe callback handled");
    Ok(Json(CallbackAck { status }))
}
