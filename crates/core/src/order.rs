//! Order documents and the order/payment state machine.
//!
//! # Lifecycle
//!
//! ```text
//! PENDING ──payment COMPLETED──▶ CONFIRMED ──▶ PROCESSING ──▶ SHIPPED ──▶ DELIVERED
//!    │                              │              │
//!    └──────────cancel──────────────┴──────────────┴──▶ CANCELLED
//! ```
//!
//! The payment sub-state moves `PENDING → COMPLETED | FAILED` exactly once.
//! Gateway callbacks and client polls both feed [`Order::apply_payment_outcome`];
//! once the payment is terminal, later outcomes are reported as
//! [`TransitionOutcome::Unchanged`] (same outcome) or
//! [`TransitionOutcome::Ignored`] (divergent outcome) and never overwrite it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::product::Product;
use crate::types::{Email, Money, OrderId, OrderStatus, PaymentStatus, Phone, ProductId};

/// Maximum quantity of a single line.
pub const MAX_LINE_QUANTITY: u32 = 10;

/// Errors raised while building a new order.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("an order must contain at least one item")]
    EmptyOrder,
    #[error("product is not available: {0}")]
    ProductUnavailable(String),
    #[error("size {size:?} is not offered for {product}")]
    InvalidSize { product: String, size: Option<String> },
    #[error("quantity must be between 1 and 10")]
    InvalidQuantity,
    #[error("postal code must be 6 digits")]
    InvalidPostalCode,
    #[error("missing shipping field: {0}")]
    MissingField(&'static str),
}

/// Errors raised by status transitions.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("order in status {status} with payment {payment} cannot be cancelled by {actor}")]
    NotCancellable {
        status: OrderStatus,
        payment: PaymentStatus,
        actor: Actor,
    },
    #[error("order cannot be confirmed before payment completes")]
    PaymentNotCompleted,
    #[error("order is cancelled")]
    OrderCancelled,
    #[error("order is already paid")]
    AlreadyPaid,
    #[error("payment for this order failed, please place a new order")]
    PaymentFailed,
}

/// Who triggered a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    Customer,
    Admin,
    /// The payment gateway's server-to-server callback.
    Gateway,
    /// A status poll against the payment gateway.
    Reconciliation,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Customer => "customer",
            Self::Admin => "admin",
            Self::Gateway => "gateway",
            Self::Reconciliation => "reconciliation",
        })
    }
}

/// A purchased product, priced at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    pub slug: String,
    pub size: Option<String>,
    pub image: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
}

impl LineItem {
    /// Price a cart line against the catalog document.
    ///
    /// # Errors
    ///
    /// Returns an [`OrderError`] if the product cannot be bought, the size is
    /// not offered, or the quantity is out of range.
    pub fn from_product(
        product: &Product,
        size: Option<String>,
        quantity: u32,
    ) -> Result<Self, OrderError> {
        if !product.is_purchasable() {
            return Err(OrderError::ProductUnavailable(product.name.clone()));
        }
        if quantity == 0 || quantity > MAX_LINE_QUANTITY {
            return Err(OrderError::InvalidQuantity);
        }

        let size = size.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty());
        let size_ok = match &size {
            Some(s) => product.sizes.iter().any(|offered| offered == s),
            None => product.sizes.is_empty(),
        };
        if !size_ok {
            return Err(OrderError::InvalidSize {
                product: product.name.clone(),
                size,
            });
        }

        Ok(Self {
            product_id: product.id,
            name: product.name.clone(),
            slug: product.slug.clone(),
            size,
            image: product.images.first().cloned(),
            unit_price: product.price,
            quantity,
            line_total: product.price * quantity,
        })
    }
}

/// Delivery address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub landmark: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub phone: Phone,
}

impl ShippingAddress {
    /// Check required fields and the PIN code.
    ///
    /// # Errors
    ///
    /// Returns the first missing or malformed field.
    pub fn validate(&self) -> Result<(), OrderError> {
        for (value, field) in [
            (&self.full_name, "fullName"),
            (&self.line1, "line1"),
            (&self.city, "city"),
            (&self.state, "state"),
        ] {
            if value.trim().is_empty() {
                return Err(OrderError::MissingField(field));
            }
        }
        let pin = self.postal_code.trim();
        if pin.len() != 6 || !pin.bytes().all(|b| b.is_ascii_digit()) || pin.starts_with('0') {
            return Err(OrderError::InvalidPostalCode);
        }
        Ok(())
    }
}

/// Flat-rate shipping with an optional free-shipping threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShippingPolicy {
    pub flat_fee: Money,
    pub free_above: Option<Money>,
}

impl ShippingPolicy {
    #[must_use]
    pub fn fee_for(&self, subtotal: Money) -> Money {
        match self.free_above {
            Some(threshold) if subtotal >= threshold => Money::ZERO,
            _ => self.flat_fee,
        }
    }
}

/// Monetary summary of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: Money,
    pub shipping: Money,
    pub total: Money,
}

impl OrderTotals {
    #[must_use]
    pub fn compute(items: &[LineItem], policy: &ShippingPolicy) -> Self {
        let subtotal: Money = items.iter().map(|item| item.line_total).sum();
        let shipping = policy.fee_for(subtotal);
        Self {
            subtotal,
            shipping,
            total: subtotal + shipping,
        }
    }
}

/// Payment sub-document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub status: PaymentStatus,
    pub amount: Money,
    /// Our transaction reference sent to the gateway.
    pub merchant_transaction_id: Option<String>,
    /// The gateway's own transaction id, once known.
    pub gateway_transaction_id: Option<String>,
    /// Last response code reported by the gateway.
    pub gateway_code: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal (or not-yet-terminal) result reported by the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Completed {
        gateway_transaction_id: Option<String>,
        code: String,
    },
    Failed {
        gateway_transaction_id: Option<String>,
        code: String,
    },
    Pending {
        code: String,
    },
}

impl PaymentOutcome {
    #[must_use]
    pub const fn status(&self) -> PaymentStatus {
        match self {
            Self::Completed { .. } => PaymentStatus::Completed,
            Self::Failed { .. } => PaymentStatus::Failed,
            Self::Pending { .. } => PaymentStatus::Pending,
        }
    }
}

/// One entry of the embedded status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub actor: Actor,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

/// Result of applying a transition to an in-memory order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The order changed and must be persisted.
    Applied,
    /// The order already reflected the requested state.
    Unchanged,
    /// The request conflicts with an already-terminal payment and was dropped.
    Ignored { reason: String },
}

impl TransitionOutcome {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Who is buying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDetails {
    pub name: String,
    pub email: Email,
    pub phone: Phone,
}

/// An order document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    /// Human-facing reference, e.g. `RW-20260301-8F3A2C`.
    pub order_number: String,
    pub customer: CustomerDetails,
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub totals: OrderTotals,
    pub status: OrderStatus,
    pub payment: Payment,
    pub status_history: Vec<StatusChange>,
    pub notes: Option<String>,
    /// Optimistic-concurrency counter, bumped on every write.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Place a new order in `PENDING` with a `PENDING` payment.
    ///
    /// # Errors
    ///
    /// Returns an [`OrderError`] if there are no items or the address is invalid.
    pub fn place(
        customer: CustomerDetails,
        items: Vec<LineItem>,
        shipping_address: ShippingAddress,
        policy: &ShippingPolicy,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        shipping_address.validate()?;

        let id = OrderId::new();
        let totals = OrderTotals::compute(&items, policy);
        let order_number = order_number(id, now);

        Ok(Self {
            id,
            order_number,
            customer,
            items,
            shipping_address,
            totals,
            status: OrderStatus::Pending,
            payment: Payment {
                status: PaymentStatus::Pending,
                amount: totals.total,
                merchant_transaction_id: None,
                gateway_transaction_id: None,
                gateway_code: None,
                updated_at: now,
            },
            status_history: vec![StatusChange {
                status: OrderStatus::Pending,
                payment_status: PaymentStatus::Pending,
                actor: Actor::Customer,
                note: Some("Order placed".to_owned()),
                at: now,
            }],
            notes: notes.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty()),
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a payment result from the gateway (callback or poll) or an admin
    /// marking the order as paid.
    pub fn apply_payment_outcome(
        &mut self,
        outcome: &PaymentOutcome,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> TransitionOutcome {
        let incoming = outcome.status();

        if incoming == PaymentStatus::Pending {
            return TransitionOutcome::Unchanged;
        }
        if self.payment.status.is_terminal() {
            if self.payment.status == incoming {
                return TransitionOutcome::Unchanged;
            }
            return TransitionOutcome::Ignored {
                reason: format!(
                    "payment already {}, refusing {incoming} from {actor}",
                    self.payment.status
                ),
            };
        }

        let (gateway_transaction_id, code) = match outcome {
            PaymentOutcome::Completed {
                gateway_transaction_id,
                code,
            }
            | PaymentOutcome::Failed {
                gateway_transaction_id,
                code,
            } => (gateway_transaction_id.clone(), code.clone()),
            PaymentOutcome::Pending { .. } => return TransitionOutcome::Unchanged,
        };

        self.payment.status = incoming;
        self.payment.gateway_code = Some(code.clone());
        if gateway_transaction_id.is_some() {
            self.payment.gateway_transaction_id = gateway_transaction_id;
        }
        self.payment.updated_at = now;

        let note = match (incoming, self.status) {
            (PaymentStatus::Completed, OrderStatus::Pending) => {
                self.status = OrderStatus::Confirmed;
                format!("Payment completed ({code})")
            }
            (PaymentStatus::Completed, OrderStatus::Cancelled) => {
                format!("Payment completed after cancellation ({code}); refund required")
            }
            (PaymentStatus::Completed, _) => format!("Payment completed ({code})"),
            _ => format!("Payment failed ({code})"),
        };

        self.record(actor, Some(note), now);
        TransitionOutcome::Applied
    }

    /// Move the order to a fulfilment status.
    ///
    /// # Errors
    ///
    /// Returns a [`LifecycleError`] if the transition is not allowed.
    pub fn transition_to(
        &mut self,
        target: OrderStatus,
        actor: Actor,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        if target == self.status {
            return Ok(TransitionOutcome::Unchanged);
        }
        if target == OrderStatus::Cancelled {
            return self.cancel(actor, note, now);
        }

        let allowed = match (self.status, target) {
            (OrderStatus::Pending, OrderStatus::Confirmed) => {
                if self.payment.status != PaymentStatus::Completed {
                    return Err(LifecycleError::PaymentNotCompleted);
                }
                true
            }
            (OrderStatus::Confirmed, OrderStatus::Processing | OrderStatus::Shipped)
            | (OrderStatus::Processing, OrderStatus::Shipped)
            | (OrderStatus::Shipped, OrderStatus::Delivered) => true,
            _ => false,
        };
        if !allowed {
            return Err(LifecycleError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        self.record(actor, note, now);
        Ok(TransitionOutcome::Applied)
    }

    /// Cancel the order.
    ///
    /// Customers may cancel only unpaid pending orders; admins may cancel any
    /// order that has not shipped.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotCancellable`] when the rules above forbid it.
    pub fn cancel(
        &mut self,
        actor: Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        if self.status == OrderStatus::Cancelled {
            return Ok(TransitionOutcome::Unchanged);
        }

        let cancellable = match actor {
            Actor::Customer => {
                self.status == OrderStatus::Pending
                    && self.payment.status != PaymentStatus::Completed
            }
            Actor::Admin => matches!(
                self.status,
                OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Processing
            ),
            Actor::Gateway | Actor::Reconciliation => false,
        };
        if !cancellable {
            return Err(LifecycleError::NotCancellable {
                status: self.status,
                payment: self.payment.status,
                actor,
            });
        }

        self.status = OrderStatus::Cancelled;
        self.record(actor, reason.or_else(|| Some("Order cancelled".to_owned())), now);
        Ok(TransitionOutcome::Applied)
    }

    /// Whether a new payment attempt may be started for this order.
    ///
    /// # Errors
    ///
    /// Fails for cancelled orders and for payments that are already terminal.
    pub const fn ensure_payable(&self) -> Result<(), LifecycleError> {
        if matches!(self.status, OrderStatus::Cancelled) {
            return Err(LifecycleError::OrderCancelled);
        }
        match self.payment.status {
            PaymentStatus::Pending => Ok(()),
            PaymentStatus::Completed => Err(LifecycleError::AlreadyPaid),
            PaymentStatus::Failed => Err(LifecycleError::PaymentFailed),
        }
    }

    /// Remember the merchant transaction id sent to the gateway.
    ///
    /// # Errors
    ///
    /// Same as [`Order::ensure_payable`]; the order is left untouched.
    pub fn attach_transaction(
        &mut self,
        merchant_transaction_id: String,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        self.ensure_payable()?;
        self.payment.merchant_transaction_id = Some(merchant_transaction_id);
        self.payment.updated_at = now;
        self.updated_at = now;
        Ok(())
    }

    fn record(&mut self, actor: Actor, note: Option<String>, now: DateTime<Utc>) {
        self.status_history.push(StatusChange {
            status: self.status,
            payment_status: self.payment.status,
            actor,
            note,
            at: now,
        });
        self.updated_at = now;
    }
}

fn order_number(id: OrderId, now: DateTime<Utc>) -> String {
    let simple = id.as_uuid().simple().to_string();
    let suffix = simple.get(..6).unwrap_or(&simple).to_ascii_uppercase();
    format!("RW-{}-{suffix}", now.format("%Y%m%d"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::product::NewProduct;

    fn product(sizes: &[&str]) -> Product {
        NewProduct {
            name: "Cloud Latex".to_owned(),
            slug: None,
            description: String::new(),
            category: "mattresses".to_owned(),
            price: Money::from_paise(2_000_000).unwrap(),
            compare_at_price: None,
            images: vec!["https://cdn.restwell.in/latex.jpg".to_owned()],
            sizes: sizes.iter().map(|s| (*s).to_owned()).collect(),
            in_stock: true,
            featured: false,
            active: true,
        }
        .into_product(Utc::now())
        .unwrap()
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Asha Rao".to_owned(),
            line1: "12 MG Road".to_owned(),
            line2: None,
            landmark: None,
            city: "Bengaluru".to_owned(),
            state: "Karnataka".to_owned(),
            postal_code: "560001".to_owned(),
            phone: Phone::parse("9876543210").unwrap(),
        }
    }

    fn customer() -> CustomerDetails {
        CustomerDetails {
            name: "Asha Rao".to_owned(),
            email: Email::parse("asha@example.in").unwrap(),
            phone: Phone::parse("9876543210").unwrap(),
        }
    }

    fn pending_order() -> Order {
        let item = LineItem::from_product(&product(&["Queen"]), Some("Queen".to_owned()), 2).unwrap();
        Order::place(
            customer(),
            vec![item],
            address(),
            &ShippingPolicy::default(),
            None,
            Utc::now(),
        )
        .unwrap()
    }

    fn completed() -> PaymentOutcome {
        PaymentOutcome::Completed {
            gateway_transaction_id: Some("T2603011234".to_owned()),
            code: "PAYMENT_SUCCESS".to_owned(),
        }
    }

    fn failed() -> PaymentOutcome {
        PaymentOutcome::Failed {
            gateway_transaction_id: None,
            code: "PAYMENT_ERROR".to_owned(),
        }
    }

    #[test]
    fn test_place_sets_pending_states() {
        let order = pending_order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment.status, PaymentStatus::Pending);
        assert_eq!(order.totals.total, Money::from_paise(4_000_000).unwrap());
        assert_eq!(order.payment.amount, order.totals.total);
        assert_eq!(order.status_history.len(), 1);
        assert!(order.order_number.starts_with("RW-"));
    }

    #[test]
    fn test_place_rejects_empty_order() {
        let result = Order::place(
            customer(),
            vec![],
            address(),
            &ShippingPolicy::default(),
            None,
            Utc::now(),
        );
        assert_eq!(result.unwrap_err(), OrderError::EmptyOrder);
    }

    #[test]
    fn test_line_item_checks_size_and_quantity() {
        let sized = product(&["Single", "Queen"]);
        assert!(matches!(
            LineItem::from_product(&sized, None, 1),
            Err(OrderError::InvalidSize { .. })
        ));
        assert!(matches!(
            LineItem::from_product(&sized, Some("King".to_owned()), 1),
            Err(OrderError::InvalidSize { .. })
        ));
        assert_eq!(
            LineItem::from_product(&sized, Some("Queen".to_owned()), 11),
            Err(OrderError::InvalidQuantity)
        );

        let unsized_product = product(&[]);
        let item = LineItem::from_product(&unsized_product, None, 3).unwrap();
        assert_eq!(item.line_total, Money::from_paise(6_000_000).unwrap());
    }

    #[test]
    fn test_line_item_rejects_out_of_stock() {
        let mut p = product(&[]);
        p.in_stock = false;
        assert!(matches!(
            LineItem::from_product(&p, None, 1),
            Err(OrderError::ProductUnavailable(_))
        ));
    }

    #[test]
    fn test_shipping_policy_threshold() {
        let policy = ShippingPolicy {
            flat_fee: Money::from_paise(49_900).unwrap(),
            free_above: Some(Money::from_paise(1_000_000).unwrap()),
        };
        assert_eq!(policy.fee_for(Money::from_paise(999_999).unwrap()), policy.flat_fee);
        assert_eq!(policy.fee_for(Money::from_paise(1_000_000).unwrap()), Money::ZERO);
    }

    #[test]
    fn test_address_validation() {
        let mut bad = address();
        bad.postal_code = "56001".to_owned();
        assert_eq!(bad.validate(), Err(OrderError::InvalidPostalCode));

        let mut bad = address();
        bad.city = " ".to_owned();
        assert_eq!(bad.validate(), Err(OrderError::MissingField("city")));
    }

    #[test]
    fn test_completed_payment_confirms_order() {
        let mut order = pending_order();
        let outcome = order.apply_payment_outcome(&completed(), Actor::Gateway, Utc::now());

        assert_eq!(outcome, TransitionOutcome::Applied);
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.payment.status, PaymentStatus::Completed);
        assert_eq!(
            order.payment.gateway_transaction_id.as_deref(),
            Some("T2603011234")
        );
        assert_eq!(order.status_history.len(), 2);
        assert_eq!(order.status_history[1].actor, Actor::Gateway);
    }

    #[test]
    fn test_failed_payment_keeps_order_pending() {
        let mut order = pending_order();
        order.apply_payment_outcome(&failed(), Actor::Reconciliation, Utc::now());

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment.status, PaymentStatus::Failed);
    }

    #[test]
    fn test_duplicate_outcome_is_unchanged() {
        let mut order = pending_order();
        order.apply_payment_outcome(&completed(), Actor::Gateway, Utc::now());
        let again = order.apply_payment_outcome(&completed(), Actor::Reconciliation, Utc::now());

        assert_eq!(again, TransitionOutcome::Unchanged);
        assert_eq!(order.status_history.len(), 2);
    }

    #[test]
    fn test_divergent_outcome_is_ignored() {
        let mut order = pending_order();
        order.apply_payment_outcome(&completed(), Actor::Gateway, Utc::now());
        let late = order.apply_payment_outcome(&failed(), Actor::Reconciliation, Utc::now());

        assert!(matches!(late, TransitionOutcome::Ignored { .. }));
        assert_eq!(order.payment.status, PaymentStatus::Completed);
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    #[test]
    fn test_pending_outcome_is_noop() {
        let mut order = pending_order();
        let outcome = order.apply_payment_outcome(
            &PaymentOutcome::Pending {
                code: "PAYMENT_PENDING".to_owned(),
            },
            Actor::Reconciliation,
            Utc::now(),
        );
        assert_eq!(outcome, TransitionOutcome::Unchanged);
        assert_eq!(order.status_history.len(), 1);
    }

    #[test]
    fn test_payment_after_cancellation_flags_refund() {
        let mut order = pending_order();
        order.cancel(Actor::Customer, None, Utc::now()).unwrap();
        order.apply_payment_outcome(&completed(), Actor::Gateway, Utc::now());

        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment.status, PaymentStatus::Completed);
        let note = order.status_history.last().unwrap().note.clone().unwrap();
        assert!(note.contains("refund required"));
    }

    #[test]
    fn test_attach_transaction_only_while_payable() {
        let mut order = pending_order();
        order.attach_transaction("T1".to_owned(), Utc::now()).unwrap();
        assert_eq!(order.payment.merchant_transaction_id.as_deref(), Some("T1"));

        order.apply_payment_outcome(&completed(), Actor::Gateway, Utc::now());
        let err = order.attach_transaction("T2".to_owned(), Utc::now()).unwrap_err();
        assert_eq!(err, LifecycleError::AlreadyPaid);
        assert_eq!(order.payment.merchant_transaction_id.as_deref(), Some("T1"));

        let mut cancelled = pending_order();
        cancelled.cancel(Actor::Customer, None, Utc::now()).unwrap();
        assert_eq!(
            cancelled.attach_transaction("T3".to_owned(), Utc::now()),
            Err(LifecycleError::OrderCancelled)
        );
    }

    #[test]
    fn test_customer_cannot_cancel_paid_order() {
        let mut order = pending_order();
        order.apply_payment_outcome(&completed(), Actor::Gateway, Utc::now());
        let err = order.cancel(Actor::Customer, None, Utc::now()).unwrap_err();
        assert!(matches!(err, LifecycleError::NotCancellable { .. }));
    }

    #[test]
    fn test_admin_cancel_rules() {
        let mut order = pending_order();
        order.apply_payment_outcome(&completed(), Actor::Gateway, Utc::now());
        order
            .transition_to(OrderStatus::Processing, Actor::Admin, None, Utc::now())
            .unwrap();
        assert!(order.cancel(Actor::Admin, None, Utc::now()).unwrap().is_applied());

        let mut shipped = pending_order();
        shipped.apply_payment_outcome(&completed(), Actor::Gateway, Utc::now());
        shipped
            .transition_to(OrderStatus::Shipped, Actor::Admin, None, Utc::now())
            .unwrap();
        assert!(shipped.cancel(Actor::Admin, None, Utc::now()).is_err());
    }

    #[test]
    fn test_cancel_twice_is_unchanged() {
        let mut order = pending_order();
        order.cancel(Actor::Customer, None, Utc::now()).unwrap();
        assert_eq!(
            order.cancel(Actor::Admin, None, Utc::now()).unwrap(),
            TransitionOutcome::Unchanged
        );
    }

    #[test]
    fn test_fulfilment_path() {
        let mut order = pending_order();
        order.apply_payment_outcome(&completed(), Actor::Gateway, Utc::now());
        for status in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            assert!(
                order
                    .transition_to(status, Actor::Admin, None, Utc::now())
                    .unwrap()
                    .is_applied()
            );
        }
        assert_eq!(
            order.transition_to(OrderStatus::Processing, Actor::Admin, None, Utc::now()),
            Err(LifecycleError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Processing,
            })
        );
    }

    #[test]
    fn test_cannot_confirm_unpaid_order_manually() {
        let mut order = pending_order();
        assert_eq!(
            order.transition_to(OrderStatus::Confirmed, Actor::Admin, None, Utc::now()),
            Err(LifecycleError::PaymentNotCompleted)
        );
        assert_eq!(
            order.transition_to(OrderStatus::Shipped, Actor::Admin, None, Utc::now()),
            Err(LifecycleError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Shipped,
            })
        );
    }
}
