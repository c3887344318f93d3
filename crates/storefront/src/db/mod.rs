//! Document persistence for the storefront.
//!
//! # Database: `restwell`
//!
//! Products, orders and customers are stored as rows with their embedded
//! arrays (line items, address, status history, images, sizes) kept as JSONB.
//!
//! ## Tables
//!
//! - `products` - Catalog documents
//! - `orders` - Order documents, with an optimistic-concurrency `version`
//! - `customers` - One row per buyer email, upserted on checkout
//! - `tower_sessions.session` - Admin session storage
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p restwell-cli -- migrate
//! ```
//!
//! Handlers never talk to `sqlx` directly; they go through the repository
//! traits below so the in-memory implementation can stand in for tests.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use restwell_core::{
    Customer, CustomerId, Email, Money, Order, OrderId, OrderStatus, PaymentStatus, Product, ProductId,
};

pub use memory::MemoryStore;
pub use postgres::{PgCustomerRepository, PgOrderRepository, PgProductRepository};

/// Default page size for admin listings.
pub const DEFAULT_PAGE_SIZE: i64 = 25;
/// Upper bound on a single page.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested document was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate slug).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The document changed since it was read.
    #[error("document was modified concurrently")]
    StaleVersion,
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Offset pagination request, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: i64,
    pub offset: i64,
}

impl PageRequest {
    #[must_use]
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

// =============================================================================
// Products
// =============================================================================

/// Catalog query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub featured: Option<bool>,
    /// Case-insensitive substring match on name and description.
    pub search: Option<String>,
    /// Admin listings include inactive products.
    pub include_inactive: bool,
}

impl ProductFilter {
    /// Whether `product` satisfies the filter.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        if !self.include_inactive && !product.active {
            return false;
        }
        if let Some(category) = &self.category
            && !product.category.eq_ignore_ascii_case(category)
        {
            return false;
        }
        if let Some(featured) = self.featured
            && product.featured != featured
        {
            return false;
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            return product.name.to_lowercase().contains(&term)
                || product.description.to_lowercase().contains(&term);
        }
        true
    }
}

/// A category with the number of active products in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub name: String,
    pub product_count: i64,
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Products matching `filter`, featured first, then by name.
    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError>;

    async fn get(&self, id: ProductId) -> Result<Product, RepositoryError>;

    async fn get_by_slug(&self, slug: &str) -> Result<Product, RepositoryError>;

    /// Fetch several products at once. Unknown ids are skipped.
    async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// Returns `Conflict` if the slug is taken.
    async fn insert(&self, product: &Product) -> Result<(), RepositoryError>;

    /// Returns `NotFound` if the product does not exist and `Conflict` if the
    /// new slug is taken.
    async fn update(&self, product: &Product) -> Result<(), RepositoryError>;

    async fn delete(&self, id: ProductId) -> Result<(), RepositoryError>;

    /// Categories of active products.
    async fn categories(&self) -> Result<Vec<CategorySummary>, RepositoryError>;

    async fn count(&self) -> Result<i64, RepositoryError>;
}

// =============================================================================
// Orders
// =============================================================================

/// Admin order query.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub email: Option<String>,
    pub page: PageRequest,
}

impl OrderFilter {
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        self.status.is_none_or(|s| order.status == s)
            && self.payment_status.is_none_or(|s| order.payment.status == s)
            && self
                .email
                .as_deref()
                .is_none_or(|e| order.customer.email.as_str().eq_ignore_ascii_case(e.trim()))
    }
}

/// Order count for one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

/// Aggregates shown on the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total_orders: i64,
    pub by_status: Vec<StatusCount>,
    pub awaiting_payment: i64,
    /// Sum of totals of orders whose payment completed.
    pub revenue: Money,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Order, RepositoryError>;

    async fn find_by_transaction(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<Order, RepositoryError>;

    /// Newest first.
    async fn list(&self, filter: &OrderFilter) -> Result<Page<Order>, RepositoryError>;

    /// Persist `order` if the stored version still equals `order.version`,
    /// then bump `order.version`.
    ///
    /// Returns `StaleVersion` if another writer got there first.
    async fn update(&self, order: &mut Order) -> Result<(), RepositoryError>;

    /// Orders with a pending payment that has been handed to the gateway and
    /// not touched since `before`.
    async fn pending_payments(&self, before: DateTime<Utc>)
    -> Result<Vec<Order>, RepositoryError>;

    async fn stats(&self) -> Result<OrderStats, RepositoryError>;
}

// =============================================================================
// Customers
// =============================================================================

/// Admin customer query.
#[derive(Debug, Clone, Default)]
pub struct CustomerFilter {
    /// Case-insensitive match on name or email.
    pub search: Option<String>,
    pub page: PageRequest,
}

impl CustomerFilter {
    #[must_use]
    pub fn matches(&self, customer: &Customer) -> bool {
        self.search.as_deref().is_none_or(|term| {
            let term = term.trim().to_lowercase();
            customer.name.to_lowercase().contains(&term) || customer.email.as_str().contains(&term)
        })
    }
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Upsert the buyer of `order` by email.
    async fn record_order(&self, order: &Order) -> Result<Customer, RepositoryError>;

    /// Add a completed payment to the customer's total spent.
    async fn record_payment(&self, email: &Email, amount: Money) -> Result<(), RepositoryError>;

    async fn get(&self, id: CustomerId) -> Result<Customer, RepositoryError>;

    /// Most recent buyers first.
    async fn list(&self, filter: &CustomerFilter) -> Result<Page<Customer>, RepositoryError>;

    async fn count(&self) -> Result<i64, RepositoryError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps() {
        assert_eq!(
            PageRequest::new(None, None),
            PageRequest {
                limit: DEFAULT_PAGE_SIZE,
                offset: 0
            }
        );
        assert_eq!(PageRequest::new(Some(1000), Some(-5)).limit, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(Some(0), Some(-5)).offset, 0);
        assert_eq!(PageRequest::new(Some(0), None).limit, 1);
    }

    #[test]
    fn test_page_map() {
        let page = Page {
            items: vec![1, 2, 3],
            total: 10,
            limit: 3,
            offset: 0,
        };
        let mapped = page.map(|n| n * 2);
        assert_eq!(mapped.items, vec![2, 4, 6]);
        assert_eq!(mapped.total, 10);
    }
}
