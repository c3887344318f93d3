//! Customer documents.
//!
//! There are no customer accounts; a customer document is upserted by email
//! whenever an order is placed so the back office can see repeat buyers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::Order;
use crate::types::{CustomerId, Email, Money, Phone};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: Email,
    pub phone: Phone,
    pub orders_count: u32,
    /// Sum of completed payments. Cancelled orders that were paid late are
    /// refunded and not counted.
    pub total_spent: Money,
    pub last_order_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// A fresh customer document for the buyer of `order`.
    #[must_use]
    pub fn from_order(order: &Order) -> Self {
        Self {
            id: CustomerId::new(),
            name: order.customer.name.clone(),
            email: order.customer.email.clone(),
            phone: order.customer.phone.clone(),
            orders_count: 1,
            total_spent: Money::ZERO,
            last_order_at: Some(order.created_at),
            created_at: order.created_at,
            updated_at: order.created_at,
        }
    }

    /// Fold another order into an existing document. Contact details are
    /// refreshed from the latest order.
    pub fn record_order(&mut self, order: &Order) {
        self.name.clone_from(&order.customer.name);
        self.phone = order.customer.phone.clone();
        self.orders_count += 1;
        self.last_order_at = Some(order.created_at);
        self.updated_at = order.created_at;
    }

    /// Add a completed payment to the running total.
    pub fn record_payment(&mut self, amount: Money, now: DateTime<Utc>) {
        self.total_spent = self.total_spent + amount;
        self.updated_at = now;
    }
}
