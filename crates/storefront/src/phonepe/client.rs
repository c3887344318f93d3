//! PhonePe PG v1 HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};

use super::error::PhonePeError;
use super::signature;
use super::types::{
    ApiResponse, CallbackBody, EncodedRequest, GatewayStatus, PayPayload, PayResponseData,
    PaymentInstrument, PaymentRequest, PaymentSession, TransactionData, outcome_for,
};
use super::PaymentGateway;
use crate::config::PhonePeConfig;

const PAY_PATH: &str = "/pg/v1/pay";
const STATUS_PATH: &str = "/pg/v1/status";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// PhonePe API client.
#[derive(Clone)]
pub struct PhonePeClient {
    client: Client,
    merchant_id: String,
    salt_key: SecretString,
    salt_index: u32,
    base_url: String,
    redirect_url: String,
    callback_url: String,
}

impl std::fmt::Debug for PhonePeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhonePeClient")
            .field("merchant_id", &self.merchant_id)
            .field("salt_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PhonePeClient {
    /// Create a new PhonePe client.
    ///
    /// # Errors
    ///
    /// Returns `PhonePeError::Config` if the HTTP client cannot be built.
    pub fn new(config: &PhonePeConfig) -> Result<Self, PhonePeError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PhonePeError::Config(e.to_string()))?;

        Ok(Self {
            client,
            merchant_id: config.merchant_id.clone(),
            salt_key: config.salt_key.clone(),
            salt_index: config.salt_index,
            base_url: config.api_base_url.clone(),
            redirect_url: config.redirect_url.clone(),
            callback_url: config.callback_url.clone(),
        })
    }

    fn checksum(&self, payload: &str) -> String {
        signature::x_verify(payload, self.salt_key.expose_secret(), self.salt_index)
    }

    /// Read a PhonePe envelope, whatever the HTTP status.
    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ApiResponse<T>, PhonePeError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PhonePeError::Response(e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| {
            error!(%status, error = %e, "Unparseable PhonePe response");
            PhonePeError::Response(format!("HTTP {status}: {e}"))
        })
    }

    fn gateway_status(
        &self,
        envelope: ApiResponse<TransactionData>,
        expected_transaction: Option<&str>,
    ) -> Result<GatewayStatus, PhonePeError> {
        let Some(data) = envelope.data else {
            return match (outcome_for(&envelope.code, None, None), expected_transaction) {
                // TRANSACTION_NOT_FOUND and friends come back without data.
                (Some(outcome), Some(txn)) => Ok(GatewayStatus {
                    merchant_transaction_id: txn.to_owned(),
                    outcome,
                    amount_paise: None,
                }),
                _ => Err(PhonePeError::Api {
                    code: envelope.code,
                    message: envelope.message,
                }),
            };
        };

        if let Some(merchant_id) = &data.merchant_id
            && merchant_id != &self.merchant_id
        {
            return Err(PhonePeError::InvalidPayload(format!(
                "unexpected merchant id {merchant_id}"
            )));
        }
        if let Some(expected) = expected_transaction
            && expected != data.merchant_transaction_id
        {
            return Err(PhonePeError::InvalidPayload(format!(
                "status for {} returned for {expected}",
                data.merchant_transaction_id
            )));
        }

        let outcome = outcome_for(
            &envelope.code,
            data.state.as_deref(),
            data.transaction_id.clone(),
        )
        .ok_or_else(|| PhonePeError::Api {
            code: envelope.code.clone(),
            message: envelope.message.clone(),
        })?;

        Ok(GatewayStatus {
            merchant_transaction_id: data.merchant_transaction_id,
            outcome,
            amount_paise: data.amount,
        })
    }
}

#[async_trait]
impl PaymentGateway for PhonePeClient {
    #[instrument(skip(self, request), fields(txn = %request.merchant_transaction_id))]
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentSession, PhonePeError> {
        let payload = PayPayload {
            merchant_id: &self.merchant_id,
            merchant_transaction_id: &request.merchant_transaction_id,
            merchant_user_id: &request.merchant_user_id,
            amount: request.amount_paise,
            redirect_url: &self.redirect_url,
            redirect_mode: "REDIRECT",
            callback_url: &self.callback_url,
            mobile_number: request.mobile_number.as_deref(),
            payment_instrument: PaymentInstrument::PAY_PAGE,
        };
        let json = serde_json::to_vec(&payload)
            .map_err(|e| PhonePeError::InvalidPayload(e.to_string()))?;
        let encoded = STANDARD.encode(json);
        let x_verify = self.checksum(&format!("{encoded}{PAY_PATH}"));

        let response = self
            .client
            .post(format!("{}{PAY_PATH}", self.base_url))
            .header("X-VERIFY", x_verify)
            .json(&EncodedRequest { request: encoded })
            .send()
            .await
            .map_err(|e| PhonePeError::Request(e.to_string()))?;

        let envelope: ApiResponse<PayResponseData> = Self::read_envelope(response).await?;
        if !envelope.success {
            warn!(code = %envelope.code, message = %envelope.message, "PhonePe rejected payment");
            return Err(PhonePeError::Api {
                code: envelope.code,
                message: envelope.message,
            });
        }

        let redirect_url = envelope
            .data
            .and_then(|d| d.instrument_response)
            .and_then(|i| i.redirect_info)
            .map(|r| r.url)
            .ok_or(PhonePeError::MissingRedirect)?;

        debug!("PhonePe payment page created");
        Ok(PaymentSession { redirect_url })
    }

    #[instrument(skip(self))]
    async fn check_status(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<GatewayStatus, PhonePeError> {
        let path = format!(
            "{STATUS_PATH}/{}/{merchant_transaction_id}",
            self.merchant_id
        );
        let x_verify = self.checksum(&path);

        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .header("X-VERIFY", x_verify)
            .header("X-MERCHANT-ID", &self.merchant_id)
            .send()
            .await
            .map_err(|e| PhonePeError::Request(e.to_string()))?;

        let envelope: ApiResponse<TransactionData> = Self::read_envelope(response).await?;
        let status = self.gateway_status(envelope, Some(merchant_transaction_id))?;
        debug!(state = %status.outcome.status(), "PhonePe status fetched");
        Ok(status)
    }

    #[instrument(skip_all)]
    fn verify_callback(
        &self,
        x_verify: &str,
        body: &CallbackBody,
    ) -> Result<GatewayStatus, PhonePeError> {
        if !signature::verify(
            &body.response,
            x_verify,
            self.salt_key.expose_secret(),
            self.salt_index,
        ) {
            return Err(PhonePeError::InvalidSignature);
        }

        let decoded = STANDARD
            .decode(body.response.trim())
            .map_err(|e| PhonePeError::InvalidPayload(format!("base64: {e}")))?;
        let envelope: ApiResponse<TransactionData> = serde_json::from_slice(&decoded)
            .map_err(|e| PhonePeError::InvalidPayload(format!("json: {e}")))?;
        if envelope.data.is_none() {
            return Err(PhonePeError::InvalidPayload("callback without data".to_owned()));
        }

        self.gateway_status(envelope, None).map_err(|e| match e {
            PhonePeError::Api { code, .. } => {
                PhonePeError::InvalidPayload(format!("unknown callback code {code}"))
            }
            other => other,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::PhonePeEnvironment;
    use restwell_core::PaymentStatus;

    const SALT: &str = "099eb0cd-02cf-4e2a-8aca-3e6c6aff0399";

    fn client() -> PhonePeClient {
        PhonePeClient::new(&PhonePeConfig {
            merchant_id: "PGTESTPAYUAT".to_owned(),
            salt_key: SecretString::from(SALT),
            salt_index: 1,
            environment: PhonePeEnvironment::Sandbox,
            api_base_url: "http://127.0.0.1:9".to_owned(),
            redirect_url: "http://localhost/checkout/result".to_owned(),
            callback_url: "http://localhost/api/payments/callback".to_owned(),
        })
        .unwrap()
    }

    fn callback(json: &str) -> (String, CallbackBody) {
        let response = STANDARD.encode(json);
        let header = signature::x_verify(&response, SALT, 1);
        (header, CallbackBody { response })
    }

    #[test]
    fn test_verify_callback_success() {
        let (header, body) = callback(
            r#"{"success":true,"code":"PAYMENT_SUCCESS","message":"ok",
                "data":{"merchantId":"PGTESTPAYUAT","merchantTransactionId":"T1",
                        "transactionId":"PP42","amount":100,"state":"COMPLETED"}}"#,
        );
        let status = client().verify_callback(&header, &body).unwrap();
        assert_eq!(status.merchant_transaction_id, "T1");
        assert_eq!(status.outcome.status(), PaymentStatus::Completed);
        assert_eq!(status.amount_paise, Some(100));
    }

    #[test]
    fn test_verify_callback_rejects_bad_signature() {
        let (_, body) = callback(r#"{"success":true,"code":"PAYMENT_SUCCESS","data":null}"#);
        let err = client()
            .verify_callback("deadbeef###1", &body)
            .unwrap_err();
        assert!(matches!(err, PhonePeError::InvalidSignature));
    }

    #[test]
    fn test_verify_callback_rejects_foreign_merchant() {
        let (header, body) = callback(
            r#"{"success":true,"code":"PAYMENT_SUCCESS",
                "data":{"merchantId":"SOMEONEELSE","merchantTransactionId":"T1"}}"#,
        );
        let err = client().verify_callback(&header, &body).unwrap_err();
        assert!(matches!(err, PhonePeError::InvalidPayload(_)));
    }

    #[test]
    fn test_verify_callback_rejects_garbage() {
        let response = "not base64!!".to_owned();
        let header = signature::x_verify(&response, SALT, 1);
        let err = client()
            .verify_callback(&header, &CallbackBody { response })
            .unwrap_err();
        assert!(matches!(err, PhonePeError::InvalidPayload(_)));
    }

    #[test]
    fn test_debug_redacts_salt() {
        let debug = format!("{:?}", client());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(SALT));
    }
}
