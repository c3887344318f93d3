//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::{
    CustomerRepository, MemoryStore, OrderRepository, PgCustomerRepository, PgOrderRepository,
    PgProductRepository, ProductRepository,
};
use crate::phonepe::PaymentGateway;
use crate::services::{CatalogService, OrderService, PaymentService};

/// Storage backends behind the services.
#[derive(Clone)]
pub struct Repositories {
    pub products: Arc<dyn ProductRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub customers: Arc<dyn CustomerRepository>,
}

impl Repositories {
    /// `PostgreSQL` repositories sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            products: Arc::new(PgProductRepository::new(pool.clone())),
            orders: Arc::new(PgOrderRepository::new(pool.clone())),
            customers: Arc::new(PgCustomerRepository::new(pool.clone())),
        }
    }

    /// In-memory repositories backed by one store.
    #[must_use]
    pub fn memory(store: &MemoryStore) -> Self {
        Self {
            products: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            customers: Arc::new(store.clone()),
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// configuration and the services.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: Option<PgPool>,
    customers: Arc<dyn CustomerRepository>,
    catalog: CatalogService,
    orders: OrderService,
    payments: PaymentService,
}

impl AppState {
    /// Create the state for a `PostgreSQL`-backed server.
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool, gateway: Arc<dyn PaymentGateway>) -> Self {
        let repositories = Repositories::postgres(&pool);
        Self::from_parts(config, repositories, gateway, Some(pool))
    }

    /// Create the state from explicit parts.
    ///
    /// `pool` is only used by the readiness probe; without one the server
    /// always reports ready.
    #[must_use]
    pub fn from_parts(
        config: StorefrontConfig,
        repositories: Repositories,
        gateway: Arc<dyn PaymentGateway>,
        pool: Option<PgPool>,
    ) -> Self {
        let catalog = CatalogService::new(repositories.products);
        let orders = OrderService::new(
            repositories.orders,
            Arc::clone(&repositories.customers),
            catalog.clone(),
            config.shipping,
        );
        let payments = PaymentService::new(orders.clone(), gateway);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                customers: repositories.customers,
                catalog,
                orders,
                payments,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// The database pool, if the server runs against `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn payments(&self) -> &PaymentService {
        &self.inner.payments
    }

    #[must_use]
    pub fn customers(&self) -> &dyn CustomerRepository {
        self.inner.customers.as_ref()
    }
}
