//! Public catalog routes.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use restwell_core::Product;

use crate::db::{CategorySummary, ProductFilter};
use crate::error::Result;
use crate::extract::{ApiPath, ApiQuery};
use crate::state::AppState;

/// Query parameters for `GET /api/products`.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub featured: Option<bool>,
    pub q: Option<String>,
}

impl From<ProductQuery> for ProductFilter {
    fn from(query: ProductQuery) -> Self {
        Self {
            category: query.category.filter(|c| !c.trim().is_empty()),
            featured: query.featured,
            search: query.q.map(|q| q.trim().to_owned()).filter(|q| !q.is_empty()),
            include_inactive: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductList {
    pub products: Vec<Product>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct CategoryList {
    pub categories: Vec<CategorySummary>,
}

/// Build the catalog router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(index))
        .route("/products/{slug}", get(show))
        .route("/categories", get(categories))
}

/// GET /api/products
#[instrument(skip(state))]
async fn index(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> Result<Json<ProductList>> {
    let products = state.catalog().list_products(query.into()).await?;
    Ok(Json(ProductList {
        count: products.len(),
        products: products.as_ref().clone(),
    }))
}

/// GET /api/products/{slug}
#[instrument(skip(state))]
async fn show(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<Product>> {
    Ok(Json(state.catalog().get_product_by_slug(&slug).await?))
}

/// GET /api/categories
async fn categories(State(state): State<AppState>) -> Result<Json<CategoryList>> {
    let categories = state.catalog().categories().await?;
    Ok(Json(CategoryList {
        categories: categories.as_ref().clone(),
    }))
}
