//! Order service.
//!
//! Checkout, order reads and every status change. Writes go through
//! [`OrderService::modify`], which applies a pure transition to a fresh copy
//! of the order and persists it with a version check. A concurrent writer
//! (e.g. a gateway callback racing a client poll) causes one reload and
//! reapply; terminal payment states are never overwritten because the core
//! transition refuses to.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use restwell_core::{
    Actor, CustomerDetails, LineItem, Order, OrderError, OrderId, OrderStatus, PaymentOutcome,
    PaymentStatus, ProductId, ShippingAddress, ShippingPolicy, TransitionOutcome,
};

use crate::db::{
    CustomerRepository, OrderFilter, OrderRepository, OrderStats, Page, RepositoryError,
};
use crate::error::{AppError, Result};
use crate::services::catalog::CatalogService;

/// Upper bound on distinct lines in one checkout.
pub const MAX_CART_LINES: usize = 20;

/// One line of the client-side cart.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    #[serde(default)]
    pub size: Option<String>,
    pub quantity: u32,
}

/// Checkout payload for `POST /api/orders`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub customer: CustomerDetails,
    pub items: Vec<CartLine>,
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Orders, customers, and the lifecycle around them.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    customers: Arc<dyn CustomerRepository>,
    catalog: CatalogService,
    shipping: ShippingPolicy,
}

impl OrderService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        customers: Arc<dyn CustomerRepository>,
        catalog: CatalogService,
        shipping: ShippingPolicy,
    ) -> Self {
        Self {
            orders,
            customers,
            catalog,
            shipping,
        }
    }

    /// Place an order from a checkout payload.
    ///
    /// Lines are re-priced from the catalog; the client never supplies prices.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Order` if the cart or address is invalid, or a
    /// repository error if the order cannot be stored.
    #[instrument(skip(self, request), fields(lines = request.items.len()))]
    pub async fn create(&self, request: CheckoutRequest) -> Result<Order> {
        if request.items.is_empty() {
            return Err(OrderError::EmptyOrder.into());
        }
        if request.items.len() > MAX_CART_LINES {
            return Err(AppError::BadRequest(format!(
                "an order may contain at most {MAX_CART_LINES} lines"
            )));
        }
        if request.customer.name.trim().is_empty() {
            return Err(OrderError::MissingField("customer.name").into());
        }

        let ids: Vec<ProductId> = request.items.iter().map(|line| line.product_id).collect();
        let products: HashMap<ProductId, _> = self
            .catalog
            .products_for_checkout(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let items = request
            .items
            .into_iter()
            .map(|line| {
                let product = products
                    .get(&line.product_id)
                    .ok_or_else(|| OrderError::ProductUnavailable(line.product_id.to_string()))?;
                LineItem::from_product(product, line.size, line.quantity)
            })
            .collect::<std::result::Result<Vec<_>, OrderError>>()?;

        let order = Order::place(
            request.customer,
            items,
            request.shipping_address,
            &self.shipping,
            request.notes,
            Utc::now(),
        )?;
        self.orders.insert(&order).await?;

        // The order is the source of truth; a failed customer upsert is logged only.
        if let Err(e) = self.customers.record_order(&order).await {
            warn!(order_id = %order.id, error = %e, "Failed to record customer");
        }

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.totals.total,
            "Order placed"
        );
        Ok(order)
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the order does not exist.
    pub async fn get(&self, id: OrderId) -> Result<Order> {
        Ok(self.orders.get(id).await?)
    }

    /// # Errors
    ///
    /// Returns `NotFound` if no order carries this transaction id.
    pub async fn find_by_transaction(&self, merchant_transaction_id: &str) -> Result<Order> {
        Ok(self.orders.find_by_transaction(merchant_transaction_id).await?)
    }

    /// # Errors
    ///
    /// Returns an error if the repository query fails.
    pub async fn list(&self, filter: &OrderFilter) -> Result<Page<Order>> {
        Ok(self.orders.list(filter).await?)
    }

    /// Orders whose payment was handed to the gateway before `before` and is
    /// still pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository query fails.
    pub async fn pending_payments(&self, before: DateTime<Utc>) -> Result<Vec<Order>> {
        Ok(self.orders.pending_payments(before).await?)
    }

    /// # Errors
    ///
    /// Returns an error if the repository query fails.
    pub async fn stats(&self) -> Result<OrderStats> {
        Ok(self.orders.stats().await?)
    }

    /// Cancel an order on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Lifecycle` if the order cannot be cancelled by `actor`.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: OrderId, actor: Actor, reason: Option<String>) -> Result<Order> {
        let order = self.orders.get(id).await?;
        let (order, outcome) = self
            .modify(order, |o| Ok(o.cancel(actor, reason.clone(), Utc::now())?))
            .await?;
        if outcome.is_applied() {
            info!(order_id = %order.id, %actor, "Order cancelled");
        }
        Ok(order)
    }

    /// Move an order to a fulfilment status (admin).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Lifecycle` if the transition is not allowed.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: OrderId,
        target: OrderStatus,
        note: Option<String>,
    ) -> Result<Order> {
        let order = self.orders.get(id).await?;
        let (order, outcome) = self
            .modify(order, |o| {
                Ok(o.transition_to(target, Actor::Admin, note.clone(), Utc::now())?)
            })
            .await?;
        if outcome.is_applied() {
            info!(order_id = %order.id, status = %order.status, "Order status updated");
        }
        Ok(order)
    }

    /// Record a payment received outside the gateway (admin).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` if the payment already failed, or a
    /// repository error.
    #[instrument(skip(self))]
    pub async fn mark_paid(&self, id: OrderId, reference: Option<String>) -> Result<Order> {
        let order = self.orders.get(id).await?;
        let outcome = PaymentOutcome::Completed {
            gateway_transaction_id: reference,
            code: "MANUAL".to_owned(),
        };
        let (order, result) = self.record_payment(order, &outcome, Actor::Admin).await?;
        if let TransitionOutcome::Ignored { reason } = result {
            return Err(AppError::Conflict(reason));
        }
        Ok(order)
    }

    /// Attach a fresh merchant transaction id before handing the order to the
    /// gateway.
    ///
    /// Payability is checked against whatever version of the order is
    /// written, including the one reloaded after a concurrent update.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Lifecycle` if the order is cancelled or its payment
    /// is terminal, or a repository error if the order cannot be stored.
    pub async fn attach_transaction(&self, order: Order, merchant_transaction_id: &str) -> Result<Order> {
        let (order, _) = self
            .modify(order, |o| {
                o.attach_transaction(merchant_transaction_id.to_owned(), Utc::now())?;
                Ok(TransitionOutcome::Applied)
            })
            .await?;
        Ok(order)
    }

    /// Apply a gateway (or admin) payment outcome to `order`.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the write fails after one retry.
    #[instrument(skip(self, order, outcome), fields(order_id = %order.id))]
    pub async fn record_payment(
        &self,
        order: Order,
        outcome: &PaymentOutcome,
        actor: Actor,
    ) -> Result<(Order, TransitionOutcome)> {
        let (order, result) = self
            .modify(order, |o| Ok(o.apply_payment_outcome(outcome, actor, Utc::now())))
            .await?;

        match &result {
            TransitionOutcome::Applied => {
                info!(
                    order_id = %order.id,
                    payment_status = %order.payment.status,
                    status = %order.status,
                    %actor,
                    "Payment outcome recorded"
                );
                // Late payments on cancelled orders are refunded, not spent.
                if order.payment.status == PaymentStatus::Completed
                    && order.status != OrderStatus::Cancelled
                    && let Err(e) = self
                        .customers
                        .record_payment(&order.customer.email, order.payment.amount)
                        .await
                {
                    warn!(order_id = %order.id, error = %e, "Failed to update customer total");
                }
            }
            TransitionOutcome::Unchanged => {}
            TransitionOutcome::Ignored { reason } => warn!(
                order_id = %order.id,
                %reason,
                "Conflicting payment outcome ignored"
            ),
        }
        Ok((order, result))
    }

    /// Apply `transition` and persist the result with an optimistic version
    /// check, reloading and reapplying once on conflict.
    async fn modify<F>(&self, order: Order, transition: F) -> Result<(Order, TransitionOutcome)>
    where
        F: Fn(&mut Order) -> Result<TransitionOutcome> + Send + Sync,
    {
        let mut current = order;
        let mut retried = false;
        loop {
            let mut candidate = current.clone();
            let outcome = transition(&mut candidate)?;
            if !outcome.is_applied() {
                return Ok((candidate, outcome));
            }

            match self.orders.update(&mut candidate).await {
                Ok(()) => return Ok((candidate, outcome)),
                Err(RepositoryError::StaleVersion) if !retried => {
                    warn!(order_id = %current.id, "Order modified concurrently, reapplying");
                    retried = true;
                    current = self.orders.get(current.id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::db::{CustomerFilter, MemoryStore};
    use restwell_core::{Email, LifecycleError, Money, NewProduct, Phone};

    struct Fixture {
        store: MemoryStore,
        service: OrderService,
        product: ProductId,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let catalog = CatalogService::new(Arc::new(store.clone()));
        let product = catalog
            .create(NewProduct {
                name: "Ortho Memory Foam".to_owned(),
                slug: None,
                description: String::new(),
                category: "mattresses".to_owned(),
                price: Money::from_paise(1_500_000).unwrap(),
                compare_at_price: None,
                images: vec![],
                sizes: vec!["Queen".to_owned(), "King".to_owned()],
                in_stock: true,
                featured: false,
                active: true,
            })
            .await
            .unwrap();
        let service = OrderService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            catalog,
            ShippingPolicy {
                flat_fee: Money::from_paise(50_000).unwrap(),
                free_above: Some(Money::from_paise(2_000_000).unwrap()),
            },
        );
        Fixture {
            store,
            service,
            product: product.id,
        }
    }

    fn checkout(product: ProductId, quantity: u32) -> CheckoutRequest {
        let phone = Phone::parse("+91 98765 43210").unwrap();
        CheckoutRequest {
            customer: CustomerDetails {
                name: "Meera Iyer".to_owned(),
                email: Email::parse("meera@example.in").unwrap(),
                phone: phone.clone(),
            },
            items: vec![CartLine {
                product_id: product,
                size: Some("Queen".to_owned()),
                quantity,
            }],
            shipping_address: ShippingAddress {
                full_name: "Meera Iyer".to_owned(),
                line1: "22 Anna Salai".to_owned(),
                line2: None,
                landmark: None,
                city: "Chennai".to_owned(),
                state: "Tamil Nadu".to_owned(),
                postal_code: "600002".to_owned(),
                phone,
            },
            notes: None,
        }
    }

    async fn only_customer(store: &MemoryStore) -> restwell_core::Customer {
        let mut page = CustomerRepository::list(store, &CustomerFilter::default())
            .await
            .unwrap();
        page.items.remove(0)
    }

    fn completed() -> PaymentOutcome {
        PaymentOutcome::Completed {
            gateway_transaction_id: Some("PP1".to_owned()),
            code: "PAYMENT_SUCCESS".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_create_prices_from_catalog_and_records_customer() {
        let f = fixture().await;
        let order = f.service.create(checkout(f.product, 1)).await.unwrap();

        assert_eq!(order.totals.subtotal, Money::from_paise(1_500_000).unwrap());
        assert_eq!(order.totals.shipping, Money::from_paise(50_000).unwrap());
        assert_eq!(order.totals.total, Money::from_paise(1_550_000).unwrap());

        let customers = CustomerRepository::list(&f.store, &CustomerFilter::default())
            .await
            .unwrap();
        assert_eq!(customers.total, 1);
        assert_eq!(customers.items[0].orders_count, 1);
    }

    #[tokio::test]
    async fn test_create_free_shipping_above_threshold() {
        let f = fixture().await;
        let order = f.service.create(checkout(f.product, 2)).await.unwrap();
        assert_eq!(order.totals.shipping, Money::ZERO);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_product() {
        let f = fixture().await;
        let err = f
            .service
            .create(checkout(ProductId::new(), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Order(OrderError::ProductUnavailable(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_cart() {
        let f = fixture().await;
        let mut request = checkout(f.product, 1);
        request.items.clear();
        let err = f.service.create(request).await.unwrap_err();
        assert!(matches!(err, AppError::Order(OrderError::EmptyOrder)));
    }

    #[tokio::test]
    async fn test_record_payment_retries_on_stale_version() {
        let f = fixture().await;
        let order = f.service.create(checkout(f.product, 1)).await.unwrap();

        // Another writer bumps the version after we read the order.
        let mut other = order.clone();
        OrderRepository::update(&f.store, &mut other).await.unwrap();

        let (updated, outcome) = f
            .service
            .record_payment(order, &completed(), Actor::Gateway)
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied);
        assert_eq!(updated.status, OrderStatus::Confirmed);
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn test_second_writer_sees_terminal_payment() {
        let f = fixture().await;
        let order = f.service.create(checkout(f.product, 1)).await.unwrap();
        let stale_copy = order.clone();

        f.service
            .record_payment(order, &completed(), Actor::Gateway)
            .await
            .unwrap();

        // A poll that read the order before the callback landed reports failure.
        let failed = PaymentOutcome::Failed {
            gateway_transaction_id: None,
            code: "PAYMENT_ERROR".to_owned(),
        };
        let (reloaded, outcome) = f
            .service
            .record_payment(stale_copy, &failed, Actor::Reconciliation)
            .await
            .unwrap();

        assert!(matches!(outcome, TransitionOutcome::Ignored { .. }));
        assert_eq!(reloaded.payment.status, PaymentStatus::Completed);
        let stored = f.service.get(reloaded.id).await.unwrap();
        assert_eq!(stored.payment.status, PaymentStatus::Completed);
        assert_eq!(stored.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_attach_transaction_after_concurrent_payment_is_rejected() {
        let f = fixture().await;
        let order = f.service.create(checkout(f.product, 1)).await.unwrap();
        let order = f.service.attach_transaction(order, "TFIRST").await.unwrap();
        let stale_copy = order.clone();

        // The callback for TFIRST lands between initiate's read and its write.
        f.service
            .record_payment(order, &completed(), Actor::Gateway)
            .await
            .unwrap();

        let err = f
            .service
            .attach_transaction(stale_copy, "TSECOND")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Lifecycle(LifecycleError::AlreadyPaid)));
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);

        let stored = f.service.find_by_transaction("TFIRST").await.unwrap();
        assert_eq!(stored.payment.status, PaymentStatus::Completed);
        assert_eq!(stored.payment.merchant_transaction_id.as_deref(), Some("TFIRST"));
    }

    #[tokio::test]
    async fn test_customer_total_counts_completed_payments_only() {
        let f = fixture().await;
        let paid = f.service.create(checkout(f.product, 1)).await.unwrap();
        let abandoned = f.service.create(checkout(f.product, 1)).await.unwrap();
        f.service
            .cancel(abandoned.id, Actor::Customer, None)
            .await
            .unwrap();

        assert_eq!(only_customer(&f.store).await.orders_count, 2);
        assert_eq!(only_customer(&f.store).await.total_spent, Money::ZERO);

        f.service.mark_paid(paid.id, None).await.unwrap();
        // Marking again is a no-op and must not double count.
        f.service.mark_paid(paid.id, None).await.unwrap();
        // A late payment on the cancelled order is owed back, not spent.
        let abandoned = f.service.get(abandoned.id).await.unwrap();
        f.service
            .record_payment(abandoned, &completed(), Actor::Gateway)
            .await
            .unwrap();

        assert_eq!(only_customer(&f.store).await.total_spent, paid.totals.total);
    }

    #[tokio::test]
    async fn test_customer_cancel_then_admin_rules() {
        let f = fixture().await;
        let order = f.service.create(checkout(f.product, 1)).await.unwrap();
        let cancelled = f
            .service
            .cancel(order.id, Actor::Customer, Some("changed my mind".to_owned()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let paid = f.service.create(checkout(f.product, 1)).await.unwrap();
        f.service.mark_paid(paid.id, Some("NEFT-123".to_owned())).await.unwrap();
        let err = f
            .service
            .cancel(paid.id, Actor::Customer, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Lifecycle(LifecycleError::NotCancellable { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_status_walks_fulfilment() {
        let f = fixture().await;
        let order = f.service.create(checkout(f.product, 1)).await.unwrap();
        let err = f
            .service
            .update_status(order.id, OrderStatus::Shipped, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Lifecycle(_)));

        f.service.mark_paid(order.id, None).await.unwrap();
        let shipped = f
            .service
            .update_status(order.id, OrderStatus::Shipped, Some("AWB 1234".to_owned()))
            .await
            .unwrap();
        assert_eq!(shipped.status, OrderStatus::Shipped);
        assert_eq!(
            shipped.status_history.last().unwrap().note.as_deref(),
            Some("AWB 1234")
        );
    }
}
