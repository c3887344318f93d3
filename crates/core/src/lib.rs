//! Restwell Core - Shared domain library.
//!
//! This crate provides the types used across all Restwell components:
//! - `storefront` - Public JSON API and admin back office
//! - `cli` - Command-line tools for migrations, seeding and reconciliation
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. The order lifecycle lives here so that every
//! trigger path (gateway callback, client poll, admin action) applies the same
//! transition rules.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, emails, phones and statuses
//! - [`product`] - Catalog documents
//! - [`order`] - Order documents and the order/payment state machine
//! - [`customer`] - Customer documents

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod customer;
pub mod order;
pub mod product;
pub mod types;

pub use customer::Customer;
pub use order::{
    Actor, CustomerDetails, LifecycleError, LineItem, Order, OrderError, OrderTotals, Payment,
    PaymentOutcome, ShippingAddress, ShippingPolicy, StatusChange, TransitionOutcome,
};
pub use product::{NewProduct, Product, ProductError};
pub use types::*;
