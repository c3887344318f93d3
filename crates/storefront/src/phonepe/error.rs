//! PhonePe-related errors.

use thiserror::Error;

/// Errors that can occur when talking to PhonePe.
#[derive(Debug, Error)]
pub enum PhonePeError {
    /// HTTP request failed.
    #[error("PhonePe request failed: {0}")]
    Request(String),

    /// Failed to parse response.
    #[error("PhonePe response error: {0}")]
    Response(String),

    /// PhonePe rejected the request.
    #[error("PhonePe API error {code}: {message}")]
    Api { code: String, message: String },

    /// The pay response carried no redirect URL.
    #[error("PhonePe did not return a payment page URL")]
    MissingRedirect,

    /// `X-VERIFY` header missing or wrong.
    #[error("Invalid PhonePe signature")]
    InvalidSignature,

    /// Callback body could not be decoded.
    #[error("Invalid PhonePe payload: {0}")]
    InvalidPayload(String),

    /// Client configuration error.
    #[error("PhonePe configuration error: {0}")]
    Config(String),
}
