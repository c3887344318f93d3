//! PhonePe PG v1 wire types.

use restwell_core::PaymentOutcome;
use serde::{Deserialize, Serialize};

/// Decoded body of `POST /pg/v1/pay` (sent base64-encoded).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayPayload<'a> {
    pub merchant_id: &'a str,
    pub merchant_transaction_id: &'a str,
    pub merchant_user_id: &'a str,
    /// Amount in paise.
    pub amount: i64,
    pub redirect_url: &'a str,
    pub redirect_mode: &'static str,
    pub callback_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<&'a str>,
    pub payment_instrument: PaymentInstrument,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentInstrument {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl PaymentInstrument {
    /// PhonePe's hosted checkout page.
    pub const PAY_PAGE: Self = Self { kind: "PAY_PAGE" };
}

/// `{"request": "<base64>"}`
#[derive(Debug, Serialize)]
pub struct EncodedRequest {
    pub request: String,
}

/// Envelope of every PhonePe response and callback.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    pub code: String,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayResponseData {
    pub merchant_transaction_id: Option<String>,
    pub instrument_response: Option<InstrumentResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentResponse {
    pub redirect_info: Option<RedirectInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedirectInfo {
    pub url: String,
}

/// Transaction details carried by status responses and callbacks.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    pub merchant_id: Option<String>,
    pub merchant_transaction_id: String,
    /// PhonePe's own transaction id.
    pub transaction_id: Option<String>,
    pub amount: Option<i64>,
    pub state: Option<String>,
    pub response_code: Option<String>,
}

/// Callback request body: `{"response": "<base64 JSON>"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackBody {
    pub response: String,
}

/// What we ask the gateway to charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub merchant_transaction_id: String,
    pub merchant_user_id: String,
    pub amount_paise: i64,
    pub mobile_number: Option<String>,
}

/// A started payment: where to send the customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub redirect_url: String,
}

/// A transaction state reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayStatus {
    pub merchant_transaction_id: String,
    pub outcome: PaymentOutcome,
    /// Amount in paise as reported by the gateway.
    pub amount_paise: Option<i64>,
}

/// Map a PhonePe response code (and transaction state) to a payment outcome.
///
/// Returns `None` for codes that describe a broken request rather than a
/// payment state (e.g. `BAD_REQUEST`, `AUTHORIZATION_FAILED`).
#[must_use]
pub fn outcome_for(
    code: &str,
    state: Option<&str>,
    transaction_id: Option<String>,
) -> Option<PaymentOutcome> {
    let code = code.to_owned();
    match code.as_str() {
        "PAYMENT_SUCCESS" => Some(PaymentOutcome::Completed {
            gateway_transaction_id: transaction_id,
            code,
        }),
        "PAYMENT_ERROR" | "PAYMENT_DECLINED" | "PAYMENT_CANCELLED" | "TIMED_OUT" => {
            Some(PaymentOutcome::Failed {
                gateway_transaction_id: transaction_id,
                code,
            })
        }
        // Still in flight, or not yet visible to the status API.
        "PAYMENT_PENDING" | "PAYMENT_INITIATED" | "INTERNAL_SERVER_ERROR"
        | "TRANSACTION_NOT_FOUND" => Some(PaymentOutcome::Pending { code }),
        _ => match state {
            Some("COMPLETED") => Some(PaymentOutcome::Completed {
                gateway_transaction_id: transaction_id,
                code,
            }),
            Some("FAILED") => Some(PaymentOutcome::Failed {
                gateway_transaction_id: transaction_id,
                code,
            }),
            Some("PENDING") => Some(PaymentOutcome::Pending { code }),
            _ => None,
        },
    }
}
