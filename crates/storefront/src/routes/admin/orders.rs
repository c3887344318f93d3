//! Admin order management.
//!
//! ```text
//! GET   /api/admin/orders                 ?status=&paymentStatus=&email=&limit=&offset=
//! GET   /api/admin/orders/{id}
//! PATCH /api/admin/orders/{id}/status     {status, note?}
//! POST  /api/admin/orders/{id}/cancel     {reason?}
//! POST  /api/admin/orders/{id}/mark-paid  {reference?}
//! ```

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    routing::{get, patch, post},
};
use serde::Deserialize;
use tracing::instrument;

use restwell_core::{Actor, Order, OrderId, OrderStatus, PaymentStatus};

use crate::db::{OrderFilter, Page, PageRequest};
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::RequireAdmin;
use crate::routes::orders::CancelRequest;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub email: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TryFrom<OrderQuery> for OrderFilter {
    type Error = AppError;

    fn try_from(query: OrderQuery) -> Result<Self> {
        let status = non_empty(query.status)
            .map(|s| s.parse::<OrderStatus>())
            .transpose()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        let payment_status = non_empty(query.payment_status)
            .map(|s| s.parse::<PaymentStatus>())
            .transpose()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        Ok(Self {
            status,
            payment_status,
            email: non_empty(query.email),
            page: PageRequest::new(query.limit, query.offset),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MarkPaid {
    #[serde(default)]
    pub reference: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(index))
        .route("/orders/{id}", get(show))
        .route("/orders/{id}/status", patch(update_status))
        .route("/orders/{id}/cancel", post(cancel))
        .route("/orders/{id}/mark-paid", post(mark_paid))
}

/// GET /api/admin/orders
#[instrument(skip_all)]
async fn index(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<OrderQuery>,
) -> Result<Json<Page<Order>>> {
    let filter = OrderFilter::try_from(query)?;
    Ok(Json(state.orders().list(&filter).await?))
}

/// GET /api/admin/orders/{id}
async fn show(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders().get(id).await?))
}

/// PATCH /api/admin/orders/{id}/status
#[instrument(skip_all, fields(admin = %admin.username, %id))]
async fn update_status(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(update): ApiJson<StatusUpdate>,
) -> Result<Json<Order>> {
    let order = state
        .orders()
        .update_status(id, update.status, update.note)
        .await?;
    Ok(Json(order))
}

/// POST /api/admin/orders/{id}/cancel
#[instrument(skip_all, fields(admin = %admin.username, %id))]
async fn cancel(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<OrderId>,
    body: Bytes,
) -> Result<Json<Order>> {
    let request = CancelRequest::from_body(&body)?;
    let order = state.orders().cancel(id, Actor::Admin, request.reason).await?;
    Ok(Json(order))
}

/// POST /api/admin/orders/{id}/mark-paid
#[instrument(skip_all, fields(admin = %admin.username, %id))]
async fn mark_paid(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<OrderId>,
    body: Bytes,
) -> Result<Json<Order>> {
    let request: MarkPaid = if body.iter().all(u8::is_ascii_whitespace) {
        MarkPaid::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?
    };
    Ok(Json(state.orders().mark_paid(id, request.reference).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_query_parses_statuses_case_insensitively() {
        let filter = OrderFilter::try_from(OrderQuery {
            status: Some("confirmed".to_owned()),
            payment_status: Some("COMPLETED".to_owned()),
            email: Some("  ".to_owned()),
            limit: Some(500),
            offset: None,
        })
        .unwrap();
        assert_eq!(filter.status, Some(OrderStatus::Confirmed));
        assert_eq!(filter.payment_status, Some(PaymentStatus::Completed));
        assert_eq!(filter.email, None);
        assert_eq!(filter.page.limit, 100);
    }

    #[test]
    fn test_query_rejects_unknown_status() {
        let err = OrderFilter::try_from(OrderQuery {
            status: Some("LOST".to_owned()),
            ..OrderQuery::default()
        })
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
