use crate::application::adjustments::QuotaAdjustmentLedger;
use crate::application::allocator::SequenceAllocator;
use crate::application::lifecycle::{
    ApplicationRequest, ApproveResponse, CardEdit, LifecycleStateMachine,
};
use crate::application::maintenance::{Maintenance, MaintenanceReport};
use crate::application::quota::{AlertQuotaLedger, DigitLookupResponse};
use crate::application::reconciler::{
    PaymentInitResponse, PaymentReconciler, ReconcilerSettings, WebhookAck,
};
use crate::config::EngineConfig;
use crate::domain::adjustment::QuotaAdjustmentEntry;
use crate::domain::application::{AlertOutcome, Application, ApplicationStatus};
use crate::domain::payment::Payment;
use crate::domain::ports::{ClockRef, PaymentGatewayRef, Stores};
use crate::error::{EngineError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaymentInitRequest {
    pub application_id: String,
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    pub application_id: String,
    pub payment_url: String,
}

/// The card lifecycle and quota engine.
///
/// `CardEngine` wires every component over one set of stores. Requests are
/// independent of each other; consistency comes from the conditional writes
/// each component issues, not from serializing callers.
#[derive(Clone)]
pub struct CardEngine {
    stores: Stores,
    lifecycle: LifecycleStateMachine,
    reconciler: PaymentReconciler,
    quota: AlertQuotaLedger,
    adjustments: QuotaAdjustmentLedger,
    maintenance: Maintenance,
}

impl CardEngine {
    /// Creates a new `CardEngine`.
    ///
    /// # Arguments
    ///
    /// * `stores` - The stores for every entity.
    /// * `gateway` - The pay page gateway; may be absent in bypass mode.
    /// * `clock` - Source of the current time.
    /// * `config` - Engine settings.
    pub fn new(
        stores: Stores,
        gateway: Option<PaymentGatewayRef>,
        clock: ClockRef,
        config: &EngineConfig,
    ) -> Self {
        let allocator = SequenceAllocator::new(stores.counters.clone());
        let adjustments = QuotaAdjustmentLedger::new(stores.adjustments.clone());
        let lifecycle = LifecycleStateMachine::new(
            stores.applications.clone(),
            allocator.clone(),
            adjustments.clone(),
            clock.clone(),
            config.activation_delay,
        );
        let reconciler = PaymentReconciler::new(
            stores.payments.clone(),
            lifecycle.clone(),
            gateway,
            clock.clone(),
            ReconcilerSettings {
                bypass_payments: config.bypass_payments,
                user_frontend_url: config.user_frontend_url.clone(),
            },
        );
        let quota = AlertQuotaLedger::new(
            stores.applications.clone(),
            clock.clone(),
            config.local_offset,
            config.ivr_fallback_number.clone(),
        );
        let maintenance = Maintenance::new(
            stores.applications.clone(),
            stores.counters.clone(),
            allocator,
            clock,
        );

        Self {
            stores,
            lifecycle,
            reconciler,
            quota,
            adjustments,
            maintenance,
        }
    }

    /// Submits an application and opens its first payment attempt.
    pub async fn apply(&self, request: ApplicationRequest) -> Result<ApplyResponse> {
        let application = self.lifecycle.submit_application(request).await?;
        let application_id = application.application_id;

        let payment = self
            .reconciler
            .initiate_payment(&application_id, Some(application.amount))
            .await
            .inspect_err(|err| {
                warn!(application_id = %application_id, error = %err, "payment initiation failed after submission");
            })?;
        self.lifecycle
            .advance_after_payment(
                &application_id,
                PaymentReconciler::status_after_initiation(&payment),
            )
            .await?;

        Ok(ApplyResponse {
            application_id,
            payment_url: payment.payment_url,
        })
    }

    pub async fn initiate_payment(&self, request: PaymentInitRequest) -> Result<PaymentInitResponse> {
        self.reconciler
            .initiate_payment(&request.application_id, request.amount)
            .await
    }

    /// Opens a new payment attempt for an application that has not paid yet.
    pub async fn retry_payment(&self, application_id: &str) -> Result<ApplyResponse> {
        let application_id = application_id.trim();
        if application_id.is_empty() {
            return Err(EngineError::validation("applicationId is required"));
        }
        let application = self
            .stores
            .applications
            .get(application_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Application not found"))?;
        if matches!(
            application.status,
            ApplicationStatus::Active | ApplicationStatus::PaidPendingApproval
        ) {
            return Err(EngineError::conflict("Payment is already completed"));
        }

        let payment = self
            .reconciler
            .initiate_payment(application_id, Some(application.amount))
            .await?;
        self.lifecycle
            .advance_after_payment(
                application_id,
                PaymentReconciler::status_after_initiation(&payment),
            )
            .await?;

        Ok(ApplyResponse {
            application_id: application_id.to_string(),
            payment_url: payment.payment_url,
        })
    }

    pub async fn handle_webhook(&self, raw: &Value) -> Result<WebhookAck> {
        self.reconciler.handle_webhook(raw).await
    }

    pub fn callback_redirect(&self, application_id: &str, code: &str) -> String {
        self.reconciler.callback_redirect(application_id, code)
    }

    pub async fn approve(&self, application_id: &str, approver: &str) -> Result<ApproveResponse> {
        self.lifecycle.approve(application_id, approver).await
    }

    pub async fn edit_card(&self, application_id: &str, edit: CardEdit) -> Result<Application> {
        self.lifecycle.edit_card(application_id, edit).await
    }

    /// A card edit that only touches the extra-alert grant.
    pub async fn adjust_extra_alerts(
        &self,
        application_id: &str,
        extra_alerts: u32,
        reason: &str,
        adjusted_by: &str,
    ) -> Result<Application> {
        let edit = CardEdit {
            extra_alerts_granted: Some(i64::from(extra_alerts)),
            extra_alerts_reason: Some(reason.to_string()),
            extra_alerts_granted_by: Some(adjusted_by.to_string()),
            ..CardEdit::default()
        };
        self.lifecycle.edit_card(application_id, edit).await
    }

    pub async fn consume_one_alert(&self, card_token: &str) -> Result<AlertOutcome> {
        self.quota.consume_one_alert(card_token).await
    }

    pub async fn ivr_lookup(&self, raw_digits: &str) -> String {
        self.quota.ivr_lookup(raw_digits).await
    }

    pub async fn resolve_card_phone(&self, digit: &str) -> Result<DigitLookupResponse> {
        self.quota.resolve_card_phone(digit).await
    }

    pub async fn adjustment_trail(&self, application_id: &str) -> Result<Vec<QuotaAdjustmentEntry>> {
        self.adjustments.entries_for(application_id).await
    }

    pub async fn application(&self, application_id: &str) -> Result<Option<Application>> {
        self.stores.applications.get(application_id.trim()).await
    }

    pub async fn payment(&self, application_id: &str) -> Result<Option<Payment>> {
        self.stores.payments.get(application_id.trim()).await
    }

    /// Every application that holds a card, oldest first.
    pub async fn roster(&self) -> Result<Vec<Application>> {
        Ok(self
            .stores
            .applications
            .get_all()
            .await?
            .into_iter()
            .filter(|app| app.card_number.is_some())
            .collect())
    }

    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        self.maintenance.run_all().await
    }
}
