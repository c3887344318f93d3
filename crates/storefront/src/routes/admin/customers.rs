//! Admin customer views.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use restwell_core::{Customer, CustomerId, Order};

use crate::db::{CustomerFilter, OrderFilter, Page, PageRequest};
use crate::error::Result;
use crate::extract::{ApiPath, ApiQuery};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CustomerQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A customer with their order history.
#[derive(Debug, Serialize)]
pub struct CustomerDetail {
    pub customer: Customer,
    pub orders: Vec<Order>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/customers", get(index))
        .route("/customers/{id}", get(show))
}

/// GET /api/admin/customers
async fn index(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CustomerQuery>,
) -> Result<Json<Page<Customer>>> {
    let filter = CustomerFilter {
        search: query.q.filter(|q| !q.trim().is_empty()),
        page: PageRequest::new(query.limit, query.offset),
    };
    Ok(Json(state.customers().list(&filter).await?))
}

/// GET /api/admin/customers/{id}
async fn show(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<CustomerId>,
) -> Result<Json<CustomerDetail>> {
    let customer = state.customers().get(id).await?;
    let orders = state
        .orders()
        .list(&OrderFilter {
            email: Some(customer.email.as_str().to_owned()),
            page: PageRequest::new(Some(100), None),
            ..OrderFilter::default()
        })
        .await?;
    Ok(Json(CustomerDetail {
        customer,
        orders: orders.items,
    }))
}
