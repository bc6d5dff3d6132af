//! Reqwest-backed PhonePe pay page adapter.
//!
//! Owns transport details only: payload encoding, the `X-VERIFY` checksum,
//! timeout and HTTP error mapping, and extraction of the redirect URL.

use crate::config::GatewaySettings;
use crate::domain::ports::{GatewayError, PayPageRequest, PaymentGateway};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::form_urlencoded;

/// API path mixed into the checksum; must match the endpoint being called.
const PAY_API_PATH: &str = "/pg/v1/pay";
const BODY_PREVIEW_CHARS: usize = 256;

/// Gateway adapter that opens PhonePe pay pages over HTTPS.
pub struct PhonePeGateway {
    client: Client,
    settings: GatewaySettings,
}

impl PhonePeGateway {
    /// Build an adapter using a reqwest client bounded by `settings.timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(settings: GatewaySettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { client, settings })
    }

    fn payload(&self, request: &PayPageRequest) -> Value {
        let backend = &self.settings.backend_public_url;
        let callback_query = form_urlencoded::Serializer::new(String::new())
            .append_pair("applicationId", &request.application_id)
            .finish();
        json!({
            "merchantId": self.settings.merchant_id,
            "merchantTransactionId": request.merchant_transaction_id,
            "merchantUserId": request.application_id,
            "amount": request.amount_in_paise,
            "redirectUrl": format!("{backend}/api/payment/callback?{callback_query}"),
            "redirectMode": self.settings.redirect_mode,
            "callbackUrl": format!("{backend}/api/payment/webhook"),
            "paymentInstrument": { "type": "PAY_PAGE" },
        })
    }
}

#[async_trait]
impl PaymentGateway for PhonePeGateway {
    async fn open_pay_page(&self, request: &PayPageRequest) -> Result<String, GatewayError> {
        let encoded = general_purpose::STANDARD.encode(self.payload(request).to_string());
        let checksum = x_verify(&encoded, &self.settings.salt_key, &self.settings.salt_index);

        debug!(
            merchant_transaction_id = %request.merchant_transaction_id,
            amount_in_paise = request.amount_in_paise,
            "opening PhonePe pay page"
        );

        let response = self
            .client
            .post(self.settings.pay_api_url.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("X-VERIFY", checksum)
            .json(&json!({ "request": encoded }))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        let decoded: Value = serde_json::from_slice(&body).map_err(|error| {
            warn!(%status, body = %body_preview(&body), "undecodable PhonePe response");
            GatewayError::Transport(format!("invalid PhonePe JSON payload: {error}"))
        })?;

        if !status.is_success() || decoded.get("success") == Some(&Value::Bool(false)) {
            return Err(map_rejection(status, &decoded));
        }

        extract_redirect_url(&decoded).ok_or(GatewayError::MissingRedirect)
    }
}

/// `hex(sha256(payload + path + salt)) + "###" + salt_index`.
pub fn x_verify(encoded_payload: &str, salt_key: &str, salt_index: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(encoded_payload.as_bytes());
    hasher.update(PAY_API_PATH.as_bytes());
    hasher.update(salt_key.as_bytes());
    format!("{}###{salt_index}", hex::encode(hasher.finalize()))
}

/// Redirect URL from either response shape the gateway has been seen to return.
pub fn extract_redirect_url(response: &Value) -> Option<String> {
    let data = response.get("data")?;
    [
        "/instrumentResponse/redirectInfo/url",
        "/redirectInfo/url",
    ]
    .into_iter()
    .filter_map(|pointer| data.pointer(pointer).and_then(Value::as_str))
    .map(str::trim)
    .find(|url| !url.is_empty())
    .map(str::to_string)
}

fn map_transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Transport("PhonePe pay API request timed out".to_string())
    } else {
        GatewayError::Transport(error.to_string())
    }
}

fn map_rejection(status: StatusCode, body: &Value) -> GatewayError {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    warn!(%status, code = ?body.get("code"), "PhonePe rejected pay page request");
    GatewayError::Rejected {
        status: status.as_u16(),
        message,
    }
}

fn body_preview(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(BODY_PREVIEW_CHARS)
        .collect()
}
