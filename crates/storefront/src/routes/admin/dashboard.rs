//! Admin dashboard summary.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use tracing::instrument;

use restwell_core::Order;

use crate::db::{OrderFilter, OrderStats, PageRequest};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

const RECENT_ORDERS: i64 = 5;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub orders: OrderStats,
    pub product_count: i64,
    pub customer_count: i64,
    pub recent_orders: Vec<Order>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard))
}

/// GET /api/admin/dashboard
#[instrument(skip_all)]
async fn dashboard(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Dashboard>> {
    let recent = OrderFilter {
        page: PageRequest::new(Some(RECENT_ORDERS), None),
        ..OrderFilter::default()
    };

    let (orders, product_count, customer_count, recent) = tokio::try_join!(
        state.orders().stats(),
        state.catalog().count(),
        async { state.customers().count().await.map_err(AppError::from) },
        state.orders().list(&recent),
    )?;

    Ok(Json(Dashboard {
        orders,
        product_count,
        customer_count,
        recent_orders: recent.items,
    }))
}
