//! In-memory repositories.
//!
//! Backs the test suite and database-less local runs. Behaves like the
//! `PostgreSQL` implementation for uniqueness, ordering and version checks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use restwell_core::{
    Customer, CustomerId, Email, Money, Order, OrderId, OrderStatus, PaymentStatus, Product, ProductId,
};

use super::{
    CategorySummary, CustomerFilter, CustomerRepository, OrderFilter, OrderRepository, OrderStats,
    Page, PageRequest, ProductFilter, ProductRepository, RepositoryError, StatusCount,
};

#[derive(Default)]
struct Collections {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    customers: HashMap<CustomerId, Customer>,
}

/// All three collections behind one lock.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T>(mut items: Vec<T>, page: PageRequest) -> Page<T> {
    let total = i64::try_from(items.len()).unwrap_or(i64::MAX);
    let offset = usize::try_from(page.offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
    let items = if offset >= items.len() {
        Vec::new()
    } else {
        items.drain(offset..).take(limit).collect()
    };
    Page {
        items,
        total,
        limit: page.limit,
        offset: page.offset,
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let data = self.inner.read().await;
        let mut products: Vec<Product> = data
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| b.featured.cmp(&a.featured).then_with(|| a.name.cmp(&b.name)));
        Ok(products)
    }

    async fn get(&self, id: ProductId) -> Result<Product, RepositoryError> {
        let data = self.inner.read().await;
        data.products.get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Product, RepositoryError> {
        let data = self.inner.read().await;
        data.products
            .values()
            .find(|p| p.slug == slug)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let data = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| data.products.get(id).cloned())
            .collect())
    }

    async fn insert(&self, product: &Product) -> Result<(), RepositoryError> {
        let mut data = self.inner.write().await;
        if data.products.values().any(|p| p.slug == product.slug) {
            return Err(RepositoryError::Conflict(
                "a product with this slug already exists".to_owned(),
            ));
        }
        data.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update(&self, product: &Product) -> Result<(), RepositoryError> {
        let mut data = self.inner.write().await;
        if !data.products.contains_key(&product.id) {
            return Err(RepositoryError::NotFound);
        }
        if data
            .products
            .values()
            .any(|p| p.slug == product.slug && p.id != product.id)
        {
            return Err(RepositoryError::Conflict(
                "a product with this slug already exists".to_owned(),
            ));
        }
        data.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let mut data = self.inner.write().await;
        data.products
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn categories(&self) -> Result<Vec<CategorySummary>, RepositoryError> {
        let data = self.inner.read().await;
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for product in data.products.values().filter(|p| p.active) {
            *counts.entry(product.category.as_str()).or_insert(0) += 1;
        }
        let mut categories: Vec<CategorySummary> = counts
            .into_iter()
            .map(|(name, product_count)| CategorySummary {
                name: name.to_owned(),
                product_count,
            })
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let data = self.inner.read().await;
        Ok(i64::try_from(data.products.len()).unwrap_or(i64::MAX))
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut data = self.inner.write().await;
        if data.orders.contains_key(&order.id) {
            return Err(RepositoryError::Conflict("order already exists".to_owned()));
        }
        data.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Order, RepositoryError> {
        let data = self.inner.read().await;
        data.orders.get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn find_by_transaction(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<Order, RepositoryError> {
        let data = self.inner.read().await;
        data.orders
            .values()
            .find(|o| o.payment.merchant_transaction_id.as_deref() == Some(merchant_transaction_id))
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Page<Order>, RepositoryError> {
        let data = self.inner.read().await;
        let mut orders: Vec<Order> = data
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(orders, filter.page))
    }

    async fn update(&self, order: &mut Order) -> Result<(), RepositoryError> {
        let mut data = self.inner.write().await;
        let stored = data.orders.get(&order.id).ok_or(RepositoryError::NotFound)?;
        if stored.version != order.version {
            return Err(RepositoryError::StaleVersion);
        }
        order.version += 1;
        data.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn pending_payments(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let data = self.inner.read().await;
        let mut orders: Vec<Order> = data
            .orders
            .values()
            .filter(|o| {
                o.payment.status == PaymentStatus::Pending
                    && o.payment.merchant_transaction_id.is_some()
                    && o.payment.updated_at < before
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn stats(&self) -> Result<OrderStats, RepositoryError> {
        let data = self.inner.read().await;
        let count = |pred: &dyn Fn(&Order) -> bool| -> i64 {
            i64::try_from(data.orders.values().filter(|o| pred(o)).count()).unwrap_or(i64::MAX)
        };

        let by_status = OrderStatus::ALL
            .iter()
            .map(|&status| StatusCount {
                status,
                count: count(&|o| o.status == status),
            })
            .filter(|s| s.count > 0)
            .collect();
        let revenue: Money = data
            .orders
            .values()
            .filter(|o| o.payment.status == PaymentStatus::Completed)
            .map(|o| o.totals.total)
            .sum();

        Ok(OrderStats {
            total_orders: count(&|_| true),
            by_status,
            awaiting_payment: count(&|o| {
                o.payment.status == PaymentStatus::Pending && o.status != OrderStatus::Cancelled
            }),
            revenue,
        })
    }
}

#[async_trait]
impl CustomerRepository for MemoryStore {
    async fn record_order(&self, order: &Order) -> Result<Customer, RepositoryError> {
        let mut data = self.inner.write().await;
        if let Some(existing) = data
            .customers
            .values_mut()
            .find(|c| c.email == order.customer.email)
        {
            existing.record_order(order);
            return Ok(existing.clone());
        }
        let customer = Customer::from_order(order);
        data.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn record_payment(&self, email: &Email, amount: Money) -> Result<(), RepositoryError> {
        let mut data = self.inner.write().await;
        let customer = data
            .customers
            .values_mut()
            .find(|c| &c.email == email)
            .ok_or(RepositoryError::NotFound)?;
        customer.record_payment(amount, Utc::now());
        Ok(())
    }

    async fn get(&self, id: CustomerId) -> Result<Customer, RepositoryError> {
        let data = self.inner.read().await;
        data.customers
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list(&self, filter: &CustomerFilter) -> Result<Page<Customer>, RepositoryError> {
        let data = self.inner.read().await;
        let mut customers: Vec<Customer> = data
            .customers
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        customers.sort_by(|a, b| b.last_order_at.cmp(&a.last_order_at));
        Ok(paginate(customers, filter.page))
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let data = self.inner.read().await;
        Ok(i64::try_from(data.customers.len()).unwrap_or(i64::MAX))
    }
}
