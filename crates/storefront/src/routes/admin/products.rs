//! Admin product management.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use tracing::instrument;

use restwell_core::{NewProduct, Product, ProductId};

use crate::db::ProductFilter;
use crate::error::Result;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::RequireAdmin;
use crate::routes::products::ProductQuery;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(index).post(create))
        .route("/products/{id}", get(show).put(update).delete(destroy))
}

/// GET /api/admin/products
#[instrument(skip_all)]
async fn index(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> Result<Json<Vec<Product>>> {
    let filter = ProductFilter::from(query);
    Ok(Json(state.catalog().admin_list(filter).await?))
}

/// POST /api/admin/products
#[instrument(skip_all, fields(admin = %admin.username))]
async fn create(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = state.catalog().create(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /api/admin/products/{id}
async fn show(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<Json<Product>> {
    Ok(Json(state.catalog().get(id).await?))
}

/// PUT /api/admin/products/{id}
#[instrument(skip_all, fields(admin = %admin.username, %id))]
async fn update(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(input): ApiJson<NewProduct>,
) -> Result<Json<Product>> {
    Ok(Json(state.catalog().update(id, input).await?))
}

/// DELETE /api/admin/products/{id}
#[instrument(skip_all, fields(admin = %admin.username, %id))]
async fn destroy(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<StatusCode> {
    state.catalog().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
