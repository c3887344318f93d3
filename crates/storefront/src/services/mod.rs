//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `catalog` - Product reads (cached) and admin product writes
//! - `orders` - Checkout, order reads and lifecycle transitions
//! - `payments` - PhonePe initiate, status poll, callback and reconciliation
//!
//! Route handlers talk only to these services; the services talk to the
//! repository traits in [`crate::db`] and the gateway trait in
//! [`crate::phonepe`].

pub mod catalog;
pub mod orders;
pub mod payments;

pub use catalog::CatalogService;
pub use orders::{CartLine, CheckoutRequest, OrderService};
pub use payments::{
    CallbackDisposition, PaymentInitiation, PaymentService, PaymentStatusView, ReconcileReport,
};
