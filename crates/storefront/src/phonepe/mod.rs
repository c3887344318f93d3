//! PhonePe payment gateway integration.
//!
//! This module provides:
//! - [`PaymentGateway`], the seam the payment service talks through
//! - [`PhonePeClient`], the PG v1 implementation (pay, status, callback)
//! - `X-VERIFY` checksum helpers in [`signature`]
//!
//! # Flow
//!
//! 1. `initiate` sends the order total and receives a hosted payment page URL
//! 2. The customer pays on PhonePe and is redirected back
//! 3. PhonePe POSTs a signed callback; `verify_callback` checks and decodes it
//! 4. Clients may also poll; `check_status` asks PhonePe directly

mod client;
mod error;
pub mod signature;
mod types;

use async_trait::async_trait;

pub use client::PhonePeClient;
pub use error::PhonePeError;
pub use types::{
    ApiResponse, CallbackBody, GatewayStatus, PaymentRequest, PaymentSession, TransactionData,
    outcome_for,
};

/// Operations the storefront needs from a payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Start a payment and return the page the customer must visit.
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentSession, PhonePeError>;

    /// Ask the gateway for the current state of a transaction.
    async fn check_status(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<GatewayStatus, PhonePeError>;

    /// Authenticate and decode a server-to-server callback.
    fn verify_callback(
        &self,
        x_verify: &str,
        body: &CallbackBody,
    ) -> Result<GatewayStatus, PhonePeError>;
}
