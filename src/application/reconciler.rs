use crate::application::lifecycle::LifecycleStateMachine;
use crate::domain::application::ApplicationStatus;
use crate::domain::payment::{
    Amount, Payment, PaymentStatus, application_id_from_merchant_transaction_id,
    merchant_transaction_id,
};
use crate::domain::ports::{ClockRef, PayPageRequest, PaymentGatewayRef, PaymentStoreRef};
use crate::error::{EngineError, Result};
use base64::{Engine as _, engine::general_purpose};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};
use url::form_urlencoded;

/// Transaction id recorded for payments synthesized in bypass mode.
pub const BYPASS_TRANSACTION_ID: &str = "BYPASS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitResponse {
    pub application_id: String,
    pub payment_url: String,
    pub merchant_transaction_id: String,
    /// True when the payment was recorded as paid without the gateway.
    #[serde(skip)]
    pub bypassed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

/// Settings the reconciler needs beyond its collaborators.
#[derive(Debug, Clone, Default)]
pub struct ReconcilerSettings {
    pub bypass_payments: bool,
    pub user_frontend_url: String,
}

/// Keeps payment rows in step with the gateway and drives the payment side
/// of the application lifecycle.
#[derive(Clone)]
pub struct PaymentReconciler {
    payments: PaymentStoreRef,
    lifecycle: LifecycleStateMachine,
    gateway: Option<PaymentGatewayRef>,
    clock: ClockRef,
    settings: ReconcilerSettings,
}

impl PaymentReconciler {
    pub fn new(
        payments: PaymentStoreRef,
        lifecycle: LifecycleStateMachine,
        gateway: Option<PaymentGatewayRef>,
        clock: ClockRef,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            payments,
            lifecycle,
            gateway,
            clock,
            settings,
        }
    }

    fn frontend_url(&self, path: &str, application_id: &str) -> String {
        let base = &self.settings.user_frontend_url;
        if application_id.is_empty() {
            format!("{base}{path}")
        } else {
            let query = form_urlencoded::Serializer::new(String::new())
                .append_pair("applicationId", application_id)
                .finish();
            format!("{base}{path}?{query}")
        }
    }

    /// Starts a payment attempt for an application.
    ///
    /// The pending row is written before the gateway is called, so a crash in
    /// between leaves evidence of the attempt.
    pub async fn initiate_payment(
        &self,
        application_id: &str,
        amount: Option<Decimal>,
    ) -> Result<PaymentInitResponse> {
        let application_id = application_id.trim();
        if application_id.is_empty() {
            return Err(EngineError::payment(400, "applicationId is required"));
        }
        let amount = amount
            .ok_or_else(|| EngineError::payment(400, "amount must be a positive number"))
            .and_then(|amount| {
                Amount::new(amount).map_err(|err| EngineError::payment(400, err.to_string()))
            })?;

        let now = self.clock.now();
        let transaction_id = merchant_transaction_id(application_id, now);

        if self.settings.bypass_payments {
            let payment_url = self.frontend_url("/success", application_id);
            let mut payment = Payment::pending(application_id, transaction_id.clone(), amount, now);
            if let Some(existing) = self.payments.get(application_id).await? {
                payment.created_at = existing.created_at;
            }
            payment.phone_pe_transaction_id = Some(BYPASS_TRANSACTION_ID.to_string());
            payment.status = PaymentStatus::Success;
            payment.payment_url = Some(payment_url.clone());
            payment.webhook_response = Some(json!({ "bypass": true }));
            payment.paid_at = Some(now);
            self.payments.upsert(payment).await?;

            info!(
                target: "parkcard::audit",
                application_id,
                amount = %amount.value(),
                "payment recorded in bypass mode"
            );
            return Ok(PaymentInitResponse {
                application_id: application_id.to_string(),
                payment_url,
                merchant_transaction_id: transaction_id,
                bypassed: true,
            });
        }

        let existing = self.payments.get(application_id).await?;
        if existing
            .as_ref()
            .is_some_and(|payment| payment.status == PaymentStatus::Success)
        {
            return Err(EngineError::payment(
                409,
                "Payment is already completed for this application",
            ));
        }
        let Some(gateway) = &self.gateway else {
            return Err(EngineError::payment(500, "Payment gateway is not configured"));
        };

        let mut payment = Payment::pending(application_id, transaction_id.clone(), amount, now);
        if let Some(existing) = existing {
            payment.created_at = existing.created_at;
        }
        self.payments.upsert(payment).await?;

        let request = PayPageRequest {
            application_id: application_id.to_string(),
            merchant_transaction_id: transaction_id.clone(),
            amount_in_paise: amount.in_paise(),
        };
        let payment_url = match gateway.open_pay_page(&request).await {
            Ok(url) => url,
            Err(err) => {
                warn!(application_id, error = %err, "payment initiation failed");
                self.settle_attempt(application_id, &transaction_id, |payment| {
                    payment.status = PaymentStatus::Failed;
                })
                .await?;
                return Err(EngineError::payment(502, err.to_string()));
            }
        };

        self.settle_attempt(application_id, &transaction_id, |payment| {
            payment.payment_url = Some(payment_url.clone());
        })
        .await?;

        info!(
            target: "parkcard::audit",
            application_id,
            merchant_transaction_id = %transaction_id,
            "payment initiated"
        );
        Ok(PaymentInitResponse {
            application_id: application_id.to_string(),
            payment_url,
            merchant_transaction_id: transaction_id,
            bypassed: false,
        })
    }

    /// Updates the payment row only while it still describes this attempt and
    /// no webhook has settled it.
    async fn settle_attempt(
        &self,
        application_id: &str,
        transaction_id: &str,
        update: impl FnOnce(&mut Payment),
    ) -> Result<()> {
        let Some(mut payment) = self.payments.get(application_id).await? else {
            return Ok(());
        };
        if payment.merchant_transaction_id != transaction_id
            || payment.status != PaymentStatus::Pending
        {
            return Ok(());
        }
        update(&mut payment);
        payment.updated_at = self.clock.now();
        self.payments.upsert(payment).await
    }

    /// Status an application moves to once a payment attempt has been opened.
    pub fn status_after_initiation(response: &PaymentInitResponse) -> ApplicationStatus {
        if response.bypassed {
            ApplicationStatus::PaidPendingApproval
        } else {
            ApplicationStatus::PaymentPending
        }
    }

    /// Applies one gateway notification.
    ///
    /// Safe under duplicates and reordering: a repeated success is acknowledged
    /// without writes, and no notification moves an approved application.
    pub async fn handle_webhook(&self, raw: &Value) -> Result<WebhookAck> {
        let payload = decode_webhook_payload(raw)?;

        let transaction_id = text_at(&payload, &["/data/merchantTransactionId", "/merchantTransactionId"]);
        let application_id = text_at(&payload, &["/data/merchantUserId", "/merchantUserId"])
            .unwrap_or_else(|| {
                application_id_from_merchant_transaction_id(
                    transaction_id.as_deref().unwrap_or_default(),
                )
            });
        if application_id.is_empty() {
            return Err(EngineError::validation("applicationId not found in webhook"));
        }

        let status = PaymentStatus::from_gateway(
            &text_at(&payload, &["/code"]).unwrap_or_default(),
            &text_at(&payload, &["/data/state", "/state"]).unwrap_or_default(),
        );
        let existing = self.payments.get(&application_id).await?;
        if status == PaymentStatus::Success
            && existing
                .as_ref()
                .is_some_and(|payment| payment.status == PaymentStatus::Success)
        {
            info!(application_id = %application_id, "duplicate success webhook ignored");
            return Ok(WebhookAck {
                success: true,
                duplicate: true,
            });
        }

        let now = self.clock.now();
        let amount_in_paise = paise_at(&payload, "/data/amount");

        let mut payment = existing.unwrap_or_else(|| Payment {
            application_id: application_id.clone(),
            merchant_transaction_id: String::new(),
            phone_pe_transaction_id: None,
            amount: Decimal::ZERO,
            amount_in_paise: 0,
            status,
            payment_url: None,
            webhook_response: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        });
        if let Some(transaction_id) = transaction_id {
            payment.merchant_transaction_id = transaction_id;
        } else if payment.merchant_transaction_id.is_empty() {
            payment.merchant_transaction_id = application_id.clone();
        }
        payment.phone_pe_transaction_id =
            text_at(&payload, &["/data/transactionId", "/transactionId"]);
        payment.status = status;
        if let Some(paise) = amount_in_paise {
            payment.amount_in_paise = paise;
            payment.amount = Decimal::new(paise, 2);
        }
        if status == PaymentStatus::Success {
            payment.paid_at = Some(now);
        }
        payment.webhook_response = Some(payload);
        payment.updated_at = now;
        self.payments.upsert(payment).await?;

        let target = match status {
            PaymentStatus::Success => Some(ApplicationStatus::PaidPendingApproval),
            PaymentStatus::Failed => Some(ApplicationStatus::PaymentPending),
            PaymentStatus::Pending => None,
        };
        if let Some(target) = target
            && self
                .lifecycle
                .advance_after_payment(&application_id, target)
                .await?
                .is_none()
        {
            warn!(application_id = %application_id, "webhook for unknown application");
        }

        info!(
            target: "parkcard::audit",
            application_id = %application_id,
            status = ?status,
            "payment webhook applied"
        );
        Ok(WebhookAck {
            success: true,
            duplicate: false,
        })
    }

    /// Where the payer's browser goes after the pay page.
    ///
    /// Only a non-empty code outside the success and pending vocabulary counts
    /// as a failure; the authoritative outcome always arrives by webhook.
    pub fn callback_redirect(&self, application_id: &str, code: &str) -> String {
        let code = code.trim().to_uppercase();
        let failed = !code.is_empty()
            && !matches!(
                code.as_str(),
                "PAYMENT_SUCCESS" | "SUCCESS" | "PAYMENT_PENDING" | "PENDING"
            );
        let path = if failed { "/failed" } else { "/success" };
        self.frontend_url(path, application_id.trim())
    }
}

/// Unwraps the notification body: either the payload itself or base64 JSON
/// carried under `response`.
pub fn decode_webhook_payload(raw: &Value) -> Result<Value> {
    let invalid = || EngineError::validation("Invalid webhook payload");
    let body = raw.as_object().ok_or_else(invalid)?;

    match body.get("response") {
        Some(Value::String(encoded)) => {
            let bytes = general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|_| invalid())?;
            serde_json::from_slice(&bytes).map_err(|_| invalid())
        }
        _ => Ok(raw.clone()),
    }
}

/// Positive paise amount at `pointer`, given either as a JSON number or as a
/// numeric string.
fn paise_at(payload: &Value, pointer: &str) -> Option<i64> {
    let amount = match payload.pointer(pointer)? {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (amount.is_finite() && amount > 0.0).then(|| amount.round() as i64)
}

/// First non-blank string (or number) found at any of the JSON pointers.
fn text_at(payload: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|pointer| payload.pointer(pointer))
        .filter_map(|value| match value {
            Value::String(text) => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .find(|text| !text.is_empty())
}
