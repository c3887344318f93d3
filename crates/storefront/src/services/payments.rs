//! Payment service.
//!
//! Three paths touch a payment: the customer starting it (`initiate`), the
//! client polling for the result (`check_status`), and PhonePe's signed
//! server-to-server callback (`handle_callback`). The poll and the callback
//! both funnel into [`OrderService::record_payment`], so whichever lands
//! first wins and the other becomes a no-op.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use restwell_core::{
    Actor, Money, Order, OrderId, OrderStatus, PaymentOutcome, PaymentStatus, TransitionOutcome,
};

use crate::db::RepositoryError;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::phonepe::{CallbackBody, GatewayStatus, PaymentGateway, PaymentRequest};
use crate::services::orders::OrderService;

/// Gateway code recorded when a reported amount does not match the order.
pub const AMOUNT_MISMATCH: &str = "AMOUNT_MISMATCH";

/// Code used when the gateway reports success without an amount; the payment
/// stays pending until a report with an amount arrives or an admin marks it
/// paid.
pub const AMOUNT_MISSING: &str = "AMOUNT_MISSING";

/// Response to `POST /api/payments/initiate`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiation {
    pub order_id: OrderId,
    pub merchant_transaction_id: String,
    pub redirect_url: String,
    pub amount: Money,
}

/// Payment state as seen by the customer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub order_id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub merchant_transaction_id: Option<String>,
    pub amount: Money,
}

impl From<&Order> for PaymentStatusView {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            status: order.status,
            payment_status: order.payment.status,
            merchant_transaction_id: order.payment.merchant_transaction_id.clone(),
            amount: order.payment.amount,
        }
    }
}

/// What a callback did to the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackDisposition {
    /// The outcome was recorded.
    Processed,
    /// The order already carried this outcome.
    Duplicate,
    /// The callback conflicted with a terminal payment or named an unknown
    /// transaction.
    Ignored,
    /// The gateway reported a non-terminal state.
    Pending,
}

impl From<&TransitionOutcome> for CallbackDisposition {
    fn from(outcome: &TransitionOutcome) -> Self {
        match outcome {
            TransitionOutcome::Applied => Self::Processed,
            TransitionOutcome::Unchanged => Self::Duplicate,
            TransitionOutcome::Ignored { .. } => Self::Ignored,
        }
    }
}

/// Summary of a batch reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub errors: usize,
}

/// Drives PhonePe payments for orders.
#[derive(Clone)]
pub struct PaymentService {
    orders: OrderService,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentService {
    #[must_use]
    pub fn new(orders: OrderService, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { orders, gateway }
    }

    /// Start (or restart) a payment for an order.
    ///
    /// A new merchant transaction id is generated on every call and stored on
    /// the order before PhonePe is contacted, so a callback can never arrive
    /// for a transaction we have not recorded.
    ///
    /// # Errors
    ///
    /// Returns `Lifecycle` (409) if the order is cancelled or its payment is already
    /// terminal, and `Gateway` if PhonePe rejects the request.
    #[instrument(skip(self))]
    pub async fn initiate(&self, order_id: OrderId) -> Result<PaymentInitiation> {
        let mut order = self.orders.get(order_id).await?;

        // A previous attempt may have completed without us hearing about it.
        if order.payment.status == PaymentStatus::Pending
            && order.payment.merchant_transaction_id.is_some()
        {
            match self.reconcile(order.clone()).await {
                Ok((refreshed, _)) => order = refreshed,
                Err(e) => warn!(error = %e, "Could not check previous payment attempt"),
            }
        }
        order.ensure_payable()?;

        let amount_paise = order
            .payment
            .amount
            .to_paise()
            .map_err(|e| AppError::Internal(format!("order amount: {e}")))?;
        let merchant_transaction_id = format!("T{}", Uuid::new_v4().simple());
        let order = self
            .orders
            .attach_transaction(order, &merchant_transaction_id)
            .await?;

        let request = PaymentRequest {
            merchant_transaction_id: merchant_transaction_id.clone(),
            merchant_user_id: format!("MU{}", order.id.as_uuid().simple()),
            amount_paise,
            mobile_number: Some(order.customer.phone.as_str().to_owned()),
        };
        let session = self.gateway.initiate(&request).await?;

        add_breadcrumb(
            "payment",
            "Payment initiated",
            Some(&[
                ("order_id", &order.id.to_string()),
                ("merchant_transaction_id", &merchant_transaction_id),
            ]),
        );
        info!(
            order_id = %order.id,
            %merchant_transaction_id,
            amount = %order.payment.amount,
            "Payment initiated"
        );

        Ok(PaymentInitiation {
            order_id: order.id,
            merchant_transaction_id,
            redirect_url: session.redirect_url,
            amount: order.payment.amount,
        })
    }

    /// Current payment state of an order, asking PhonePe if it is still pending.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown order and `Gateway` if PhonePe cannot
    /// be reached.
    #[instrument(skip(self))]
    pub async fn check_status(&self, order_id: OrderId) -> Result<PaymentStatusView> {
        let order = self.orders.get(order_id).await?;
        if order.payment.status != PaymentStatus::Pending
            || order.payment.merchant_transaction_id.is_none()
        {
            return Ok(PaymentStatusView::from(&order));
        }

        let (order, _) = self.reconcile(order).await?;
        Ok(PaymentStatusView::from(&order))
    }

    /// Authenticate and apply a PhonePe callback.
    ///
    /// # Errors
    ///
    /// Returns `Gateway(InvalidSignature)` for a bad `X-VERIFY`,
    /// `Gateway(InvalidPayload)` for an undecodable body, and a repository
    /// error if the order cannot be stored.
    #[instrument(skip_all)]
    pub async fn handle_callback(
        &self,
        x_verify: &str,
        body: &CallbackBody,
    ) -> Result<CallbackDisposition> {
        let status = self.gateway.verify_callback(x_verify, body)?;

        let order = match self
            .orders
            .find_by_transaction(&status.merchant_transaction_id)
            .await
        {
            Ok(order) => order,
            Err(AppError::Database(RepositoryError::NotFound)) => {
                warn!(
                    merchant_transaction_id = %status.merchant_transaction_id,
                    "Callback for unknown transaction"
                );
                return Ok(CallbackDisposition::Ignored);
            }
            Err(e) => return Err(e),
        };

        let outcome = checked_outcome(&order, &status);
        if outcome.status() == PaymentStatus::Pending {
            return Ok(CallbackDisposition::Pending);
        }

        // Losing the version race twice is a 500 so PhonePe retries the callback.
        let (order, result) = self
            .orders
            .record_payment(order, &outcome, Actor::Gateway)
            .await
            .map_err(|e| match e {
                AppError::Database(RepositoryError::StaleVersion) => AppError::Internal(
                    "order changed concurrently while applying callback".to_owned(),
                ),
                e => e,
            })?;
        add_breadcrumb(
            "payment",
            "Callback processed",
            Some(&[
                ("order_id", &order.id.to_string()),
                ("payment_status", order.payment.status.as_str()),
            ]),
        );
        Ok(CallbackDisposition::from(&result))
    }

    /// Poll PhonePe for every payment left pending since `older_than` ago.
    ///
    /// Individual failures are logged and counted; the batch carries on.
    ///
    /// # Errors
    ///
    /// Returns an error only if the pending orders cannot be listed.
    #[instrument(skip(self))]
    pub async fn reconcile_pending(&self, older_than: Duration) -> Result<ReconcileReport> {
        let pending = self.orders.pending_payments(Utc::now() - older_than).await?;
        let mut report = ReconcileReport::default();

        for order in pending {
            report.checked += 1;
            let order_id = order.id;
            match self.reconcile(order).await {
                Ok((order, _)) => match order.payment.status {
                    PaymentStatus::Completed => report.completed += 1,
                    PaymentStatus::Failed => report.failed += 1,
                    PaymentStatus::Pending => report.still_pending += 1,
                },
                Err(e) => {
                    report.errors += 1;
                    warn!(%order_id, error = %e, "Reconciliation failed");
                }
            }
        }

        info!(?report, "Reconciliation finished");
        Ok(report)
    }

    async fn reconcile(&self, order: Order) -> Result<(Order, TransitionOutcome)> {
        let Some(txn) = order.payment.merchant_transaction_id.clone() else {
            return Ok((order, TransitionOutcome::Unchanged));
        };
        let status = self.gateway.check_status(&txn).await?;
        let outcome = checked_outcome(&order, &status);
        self.orders
            .record_payment(order, &outcome, Actor::Reconciliation)
            .await
    }
}

/// The gateway's outcome, checked against the order total. A success for a
/// different amount becomes a failure; a success with no amount is not
/// trusted and stays pending.
fn checked_outcome(order: &Order, status: &GatewayStatus) -> PaymentOutcome {
    let PaymentOutcome::Completed {
        gateway_transaction_id,
        ..
    } = &status.outcome
    else {
        return status.outcome.clone();
    };

    match (status.amount_paise, order.payment.amount.to_paise()) {
        (Some(reported), Ok(expected)) if reported == expected => status.outcome.clone(),
        (Some(reported), Ok(expected)) => {
            error!(
                order_id = %order.id,
                reported,
                expected,
                "Gateway reported a different amount"
            );
            PaymentOutcome::Failed {
                gateway_transaction_id: gateway_transaction_id.clone(),
                code: AMOUNT_MISMATCH.to_owned(),
            }
        }
        (None, _) | (_, Err(_)) => {
            error!(
                order_id = %order.id,
                reported = ?status.amount_paise,
                "Gateway success could not be matched to the order amount"
            );
            PaymentOutcome::Pending {
                code: AMOUNT_MISSING.to_owned(),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::db::{MemoryStore, OrderFilter, OrderRepository, OrderStats, Page};
    use crate::phonepe::{PaymentSession, PhonePeError};
    use crate::services::catalog::CatalogService;
    use crate::services::orders::{CartLine, CheckoutRequest};
    use restwell_core::{
        CustomerDetails, Email, LifecycleError, NewProduct, Phone, ShippingAddress, ShippingPolicy,
    };

    /// Gateway double: `initiate` always succeeds, `check_status` replays the
    /// scripted outcome, callbacks are trusted when the header is `ok`.
    #[derive(Default)]
    struct ScriptedGateway {
        status: Mutex<Option<PaymentOutcome>>,
        amount: Mutex<Option<i64>>,
        initiated: Mutex<Vec<PaymentRequest>>,
    }

    impl ScriptedGateway {
        fn settle(&self, outcome: PaymentOutcome, amount: Option<i64>) {
            *self.status.lock().unwrap() = Some(outcome);
            *self.amount.lock().unwrap() = amount;
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn initiate(
            &self,
            request: &PaymentRequest,
        ) -> std::result::Result<PaymentSession, PhonePeError> {
            self.initiated.lock().unwrap().push(request.clone());
            Ok(PaymentSession {
                redirect_url: format!("https://pay.example/{}", request.merchant_transaction_id),
            })
        }

        async fn check_status(
            &self,
            merchant_transaction_id: &str,
        ) -> std::result::Result<GatewayStatus, PhonePeError> {
            let outcome = self
                .status
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(PaymentOutcome::Pending {
                    code: "PAYMENT_PENDING".to_owned(),
                });
            Ok(GatewayStatus {
                merchant_transaction_id: merchant_transaction_id.to_owned(),
                outcome,
                amount_paise: *self.amount.lock().unwrap(),
            })
        }

        fn verify_callback(
            &self,
            x_verify: &str,
            body: &CallbackBody,
        ) -> std::result::Result<GatewayStatus, PhonePeError> {
            if x_verify != "ok" {
                return Err(PhonePeError::InvalidSignature);
            }
            let (txn, code) = body
                .response
                .split_once(':')
                .ok_or_else(|| PhonePeError::InvalidPayload("format".to_owned()))?;
            let outcome = crate::phonepe::outcome_for(code, None, Some("PP9".to_owned()))
                .ok_or_else(|| PhonePeError::InvalidPayload(code.to_owned()))?;
            Ok(GatewayStatus {
                merchant_transaction_id: txn.to_owned(),
                outcome,
                amount_paise: *self.amount.lock().unwrap(),
            })
        }
    }

    struct Fixture {
        store: MemoryStore,
        gateway: Arc<ScriptedGateway>,
        orders: OrderService,
        payments: PaymentService,
        order: Order,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let catalog = CatalogService::new(Arc::new(store.clone()));
        let product = catalog
            .create(NewProduct {
                name: "Hybrid Spring".to_owned(),
                slug: None,
                description: String::new(),
                category: "mattresses".to_owned(),
                price: Money::from_paise(2_499_900).unwrap(),
                compare_at_price: None,
                images: vec![],
                sizes: vec![],
                in_stock: true,
                featured: true,
                active: true,
            })
            .await
            .unwrap();
        let orders = OrderService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            catalog,
            ShippingPolicy {
                flat_fee: Money::ZERO,
                free_above: None,
            },
        );
        let phone = Phone::parse("9123456780").unwrap();
        let order = orders
            .create(CheckoutRequest {
                customer: CustomerDetails {
                    name: "Arjun Rao".to_owned(),
                    email: Email::parse("arjun@example.in").unwrap(),
                    phone: phone.clone(),
                },
                items: vec![CartLine {
                    product_id: product.id,
                    size: None,
                    quantity: 1,
                }],
                shipping_address: ShippingAddress {
                    full_name: "Arjun Rao".to_owned(),
                    line1: "5 MG Road".to_owned(),
                    line2: None,
                    landmark: None,
                    city: "Bengaluru".to_owned(),
                    state: "Karnataka".to_owned(),
                    postal_code: "560001".to_owned(),
                    phone,
                },
                notes: None,
            })
            .await
            .unwrap();
        let gateway = Arc::new(ScriptedGateway::default());
        let payments = PaymentService::new(orders.clone(), gateway.clone());
        Fixture {
            store,
            gateway,
            orders,
            payments,
            order,
        }
    }

    fn success() -> PaymentOutcome {
        PaymentOutcome::Completed {
            gateway_transaction_id: Some("PP1".to_owned()),
            code: "PAYMENT_SUCCESS".to_owned(),
        }
    }

    #[tokio::test]
    async fn test_initiate_records_transaction_before_redirect() {
        let f = fixture().await;
        let started = f.payments.initiate(f.order.id).await.unwrap();

        assert!(started.merchant_transaction_id.starts_with('T'));
        assert!(started.merchant_transaction_id.len() <= 35);
        assert!(started.redirect_url.ends_with(&started.merchant_transaction_id));

        let requests = f.gateway.initiated.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].amount_paise, 2_499_900);
        assert_eq!(requests[0].mobile_number.as_deref(), Some("9123456780"));

        let stored = f.orders.get(f.order.id).await.unwrap();
        assert_eq!(
            stored.payment.merchant_transaction_id.as_deref(),
            Some(started.merchant_transaction_id.as_str())
        );
    }

    #[tokio::test]
    async fn test_reinitiate_uses_fresh_transaction() {
        let f = fixture().await;
        let first = f.payments.initiate(f.order.id).await.unwrap();
        let second = f.payments.initiate(f.order.id).await.unwrap();
        assert_ne!(first.merchant_transaction_id, second.merchant_transaction_id);
    }

    #[tokio::test]
    async fn test_initiate_rejects_paid_or_cancelled_orders() {
        let f = fixture().await;
        f.payments.initiate(f.order.id).await.unwrap();
        f.gateway.settle(success(), Some(2_499_900));

        // The pending attempt is checked first and turns out to be paid.
        let err = f.payments.initiate(f.order.id).await.unwrap_err();
        assert!(matches!(err, AppError::Lifecycle(LifecycleError::AlreadyPaid)));
        let stored = f.orders.get(f.order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);

        let f = fixture().await;
        f.orders
            .cancel(f.order.id, Actor::Customer, None)
            .await
            .unwrap();
        let err = f.payments.initiate(f.order.id).await.unwrap_err();
        assert!(matches!(err, AppError::Lifecycle(LifecycleError::OrderCancelled)));
    }

    #[tokio::test]
    async fn test_check_status_polls_gateway_while_pending() {
        let f = fixture().await;
        f.payments.initiate(f.order.id).await.unwrap();

        let view = f.payments.check_status(f.order.id).await.unwrap();
        assert_eq!(view.payment_status, PaymentStatus::Pending);

        f.gateway.settle(success(), Some(2_499_900));
        let view = f.payments.check_status(f.order.id).await.unwrap();
        assert_eq!(view.payment_status, PaymentStatus::Completed);
        assert_eq!(view.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_amount_mismatch_fails_payment() {
        let f = fixture().await;
        f.payments.initiate(f.order.id).await.unwrap();
        f.gateway.settle(success(), Some(100));

        let view = f.payments.check_status(f.order.id).await.unwrap();
        assert_eq!(view.payment_status, PaymentStatus::Failed);
        assert_eq!(view.status, OrderStatus::Pending);
        let stored = f.orders.get(f.order.id).await.unwrap();
        assert_eq!(stored.payment.gateway_code.as_deref(), Some(AMOUNT_MISMATCH));
    }

    #[tokio::test]
    async fn test_callback_then_duplicate_then_divergent() {
        let f = fixture().await;
        let started = f.payments.initiate(f.order.id).await.unwrap();
        let txn = started.merchant_transaction_id;
        f.gateway.settle(success(), Some(2_499_900));

        let body = CallbackBody {
            response: format!("{txn}:PAYMENT_SUCCESS"),
        };
        let first = f.payments.handle_callback("ok", &body).await.unwrap();
        assert_eq!(first, CallbackDisposition::Processed);
        let again = f.payments.handle_callback("ok", &body).await.unwrap();
        assert_eq!(again, CallbackDisposition::Duplicate);

        let failed = CallbackBody {
            response: format!("{txn}:PAYMENT_ERROR"),
        };
        let late = f.payments.handle_callback("ok", &failed).await.unwrap();
        assert_eq!(late, CallbackDisposition::Ignored);

        let stored = f.orders.get(f.order.id).await.unwrap();
        assert_eq!(stored.payment.status, PaymentStatus::Completed);
        assert_eq!(stored.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_callback_unknown_transaction_and_bad_signature() {
        let f = fixture().await;
        let body = CallbackBody {
            response: "TNOPE:PAYMENT_SUCCESS".to_owned(),
        };
        let ignored = f.payments.handle_callback("ok", &body).await.unwrap();
        assert_eq!(ignored, CallbackDisposition::Ignored);

        let err = f.payments.handle_callback("forged", &body).await.unwrap_err();
        assert!(matches!(err, AppError::Gateway(PhonePeError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_reconcile_pending_counts_outcomes() {
        let f = fixture().await;
        f.payments.initiate(f.order.id).await.unwrap();
        f.gateway.settle(success(), Some(2_499_900));

        let report = f
            .payments
            .reconcile_pending(Duration::minutes(-1))
            .await
            .unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                checked: 1,
                completed: 1,
                ..ReconcileReport::default()
            }
        );
    }

    #[tokio::test]
    async fn test_success_without_amount_does_not_confirm() {
        let f = fixture().await;
        let started = f.payments.initiate(f.order.id).await.unwrap();
        f.gateway.settle(success(), None);

        let view = f.payments.check_status(f.order.id).await.unwrap();
        assert_eq!(view.payment_status, PaymentStatus::Pending);
        assert_eq!(view.status, OrderStatus::Pending);

        let body = CallbackBody {
            response: format!("{}:PAYMENT_SUCCESS", started.merchant_transaction_id),
        };
        let disposition = f.payments.handle_callback("ok", &body).await.unwrap();
        assert_eq!(disposition, CallbackDisposition::Pending);

        let report = f
            .payments
            .reconcile_pending(Duration::minutes(-1))
            .await
            .unwrap();
        assert_eq!(report.still_pending, 1);
        assert_eq!(report.completed, 0);

        let stored = f.orders.get(f.order.id).await.unwrap();
        assert_eq!(stored.payment.status, PaymentStatus::Pending);
        assert_eq!(stored.status, OrderStatus::Pending);
    }

    /// Order repository whose writes always lose the version check.
    struct ContendedOrders(MemoryStore);

    #[async_trait]
    impl OrderRepository for ContendedOrders {
        async fn insert(&self, order: &Order) -> std::result::Result<(), RepositoryError> {
            OrderRepository::insert(&self.0, order).await
        }

        async fn get(&self, id: OrderId) -> std::result::Result<Order, RepositoryError> {
            OrderRepository::get(&self.0, id).await
        }

        async fn find_by_transaction(
            &self,
            merchant_transaction_id: &str,
        ) -> std::result::Result<Order, RepositoryError> {
            OrderRepository::find_by_transaction(&self.0, merchant_transaction_id).await
        }

        async fn list(
            &self,
            filter: &OrderFilter,
        ) -> std::result::Result<Page<Order>, RepositoryError> {
            OrderRepository::list(&self.0, filter).await
        }

        async fn update(&self, _order: &mut Order) -> std::result::Result<(), RepositoryError> {
            Err(RepositoryError::StaleVersion)
        }

        async fn pending_payments(
            &self,
            before: chrono::DateTime<Utc>,
        ) -> std::result::Result<Vec<Order>, RepositoryError> {
            OrderRepository::pending_payments(&self.0, before).await
        }

        async fn stats(&self) -> std::result::Result<OrderStats, RepositoryError> {
            OrderRepository::stats(&self.0).await
        }
    }

    #[tokio::test]
    async fn test_callback_that_keeps_losing_version_race_asks_for_retry() {
        let f = fixture().await;
        let started = f.payments.initiate(f.order.id).await.unwrap();
        f.gateway.settle(success(), Some(2_499_900));

        let contended = OrderService::new(
            Arc::new(ContendedOrders(f.store.clone())),
            Arc::new(f.store.clone()),
            CatalogService::new(Arc::new(f.store.clone())),
            ShippingPolicy::default(),
        );
        let payments = PaymentService::new(contended, f.gateway.clone());

        let body = CallbackBody {
            response: format!("{}:PAYMENT_SUCCESS", started.merchant_transaction_id),
        };
        let err = payments.handle_callback("ok", &body).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        let stored = f.orders.get(f.order.id).await.unwrap();
        assert_eq!(stored.payment.status, PaymentStatus::Pending);
    }
}
