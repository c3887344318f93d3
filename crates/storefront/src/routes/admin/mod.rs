//! Admin back-office API, mounted at `/api/admin`.
//!
//! Every handler except login, logout and the session probe takes the
//! [`RequireAdmin`](crate::middleware::RequireAdmin) extractor.

pub mod auth;
pub mod customers;
pub mod dashboard;
pub mod orders;
pub mod products;

use axum::Router;

use crate::state::AppState;

/// Admin routes other than login.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(dashboard::router())
        .merge(products::router())
        .merge(orders::router())
        .merge(customers::router())
}
