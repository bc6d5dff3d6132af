use crate::application::adjustments::QuotaAdjustmentLedger;
use crate::application::allocator::SequenceAllocator;
use crate::domain::application::{ApplicantProfile, Application, ApplicationStatus, Validity};
use crate::domain::payment::Amount;
use crate::domain::phone::{canonical_phone, canonical_vehicle};
use crate::domain::plan::PlanCode;
use crate::domain::ports::{ApplicationStoreRef, ClockRef};
use crate::domain::sequence::CARD_NUMBER_SEQUENCE;
use crate::error::{EngineError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_APPROVER: &str = "admin";

/// Applicant input for a new subscription request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplicationRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub vehicle: String,
    pub plan: String,
    /// Falls back to the plan's list price when absent or not positive.
    pub amount: Option<Decimal>,
    pub validity_months: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveResponse {
    pub application_id: String,
    pub status: ApplicationStatus,
    pub card_number: Option<String>,
}

/// Staff edit of an issued card. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CardEdit {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub vehicle: Option<String>,
    pub status: Option<String>,
    pub plan: Option<String>,
    pub amount: Option<Decimal>,
    pub active_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub extra_alerts_granted: Option<i64>,
    pub extra_alerts_reason: Option<String>,
    pub extra_alerts_granted_by: Option<String>,
}

/// A [`CardEdit`] whose fields passed the checks that need no stored state.
struct CheckedEdit {
    name: Option<String>,
    phone: Option<String>,
    vehicle: Option<String>,
    status: Option<ApplicationStatus>,
    plan: Option<PlanCode>,
    amount: Option<Decimal>,
    active_date: Option<DateTime<Utc>>,
    expiry_date: Option<DateTime<Utc>>,
    extra_alerts: Option<u32>,
    reason: String,
    adjusted_by: String,
}

impl CardEdit {
    fn check(self) -> Result<CheckedEdit> {
        let name = match self.name.as_deref().map(str::trim) {
            Some("") => return Err(EngineError::validation("name must not be empty")),
            other => other.map(str::to_string),
        };
        let phone = self
            .phone
            .as_deref()
            .map(|raw| {
                canonical_phone(raw).ok_or_else(|| {
                    EngineError::validation("phone must be a valid 10-digit mobile number")
                })
            })
            .transpose()?;
        let vehicle = self
            .vehicle
            .as_deref()
            .map(|raw| {
                canonical_vehicle(raw).ok_or_else(|| {
                    EngineError::validation("vehicle must be a valid registration format")
                })
            })
            .transpose()?;
        let status = self
            .status
            .as_deref()
            .map(|raw| {
                ApplicationStatus::parse_card_status(raw)
                    .ok_or_else(|| EngineError::validation("Invalid status value"))
            })
            .transpose()?;
        let plan = match self.plan.as_deref().map(PlanCode::new) {
            Some(plan) if plan.is_empty() => {
                return Err(EngineError::validation("plan must not be empty"));
            }
            other => other,
        };
        let amount = match self.amount {
            Some(amount) if amount < Decimal::ZERO => {
                return Err(EngineError::validation("amount must not be negative"));
            }
            other => other.map(|amount| amount.round_dp(2)),
        };
        let extra_alerts = self
            .extra_alerts_granted
            .map(|extra| {
                u32::try_from(extra).map_err(|_| {
                    EngineError::validation("extraAlertsGranted must be a non-negative integer")
                })
            })
            .transpose()?;

        Ok(CheckedEdit {
            name,
            phone,
            vehicle,
            status,
            plan,
            amount,
            active_date: self.active_date,
            expiry_date: self.expiry_date,
            extra_alerts,
            reason: self.extra_alerts_reason.unwrap_or_default(),
            adjusted_by: self.extra_alerts_granted_by.unwrap_or_default(),
        })
    }
}

fn new_application_id() -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("APP-{}", &hex[..12])
}

/// Owns application status and the transitions between states.
///
/// Every write is conditional on the revision that was read; a lost race
/// re-reads and re-decides rather than overwriting.
#[derive(Clone)]
pub struct LifecycleStateMachine {
    applications: ApplicationStoreRef,
    allocator: SequenceAllocator,
    ledger: QuotaAdjustmentLedger,
    clock: ClockRef,
    activation_delay: Duration,
}

impl LifecycleStateMachine {
    pub fn new(
        applications: ApplicationStoreRef,
        allocator: SequenceAllocator,
        ledger: QuotaAdjustmentLedger,
        clock: ClockRef,
        activation_delay: Duration,
    ) -> Self {
        Self {
            applications,
            allocator,
            ledger,
            clock,
            activation_delay,
        }
    }

    pub async fn submit_application(&self, request: ApplicationRequest) -> Result<Application> {
        let name = request.name.trim().to_string();
        let email = request.email.trim().to_lowercase();
        let phone = request.phone.trim().to_string();
        let vehicle = request.vehicle.trim().to_string();
        let plan = PlanCode::new(&request.plan);
        let amount = request
            .amount
            .filter(|amount| *amount > Decimal::ZERO)
            .or_else(|| plan.list_price());

        let Some(amount) = amount.filter(|_| {
            !(name.is_empty()
                || email.is_empty()
                || phone.is_empty()
                || vehicle.is_empty()
                || plan.is_empty())
        }) else {
            return Err(EngineError::validation(
                "name, email, phone, vehicle, plan and valid amount are required",
            ));
        };
        let amount = Amount::new(amount)?.value();

        let application = Application::new(
            new_application_id(),
            ApplicantProfile {
                name,
                email,
                phone,
                vehicle,
            },
            plan,
            amount,
            Validity::from_months(request.validity_months),
            self.clock.now(),
        );
        let stored = self.applications.insert(application).await?;

        info!(
            target: "parkcard::audit",
            application_id = %stored.application_id,
            plan = %stored.plan,
            "application submitted"
        );
        Ok(stored)
    }

    /// Issues a card for a paid application.
    ///
    /// Approving an already active application returns its card without a
    /// second allocation. At most one token is drawn per call, even when the
    /// status write has to be retried.
    pub async fn approve(&self, application_id: &str, approver: &str) -> Result<ApproveResponse> {
        let application_id = application_id.trim();
        if application_id.is_empty() {
            return Err(EngineError::validation("applicationId is required"));
        }
        let approver = match approver.trim() {
            "" => DEFAULT_APPROVER,
            approver => approver,
        };

        let mut allocated: Option<String> = None;
        loop {
            let application = self
                .applications
                .get(application_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Application not found"))?;

            if application.status == ApplicationStatus::Active {
                if let Some(burned) = &allocated {
                    warn!(application_id, card_number = %burned, "card number burned by concurrent approval");
                }
                return Ok(ApproveResponse {
                    application_id: application.application_id,
                    status: ApplicationStatus::Active,
                    card_number: application.card_number,
                });
            }
            if application.status != ApplicationStatus::PaidPendingApproval {
                return Err(EngineError::conflict(format!(
                    "Cannot approve application with status {}",
                    application.status
                )));
            }

            let card_number = match &allocated {
                Some(card_number) => card_number.clone(),
                None => {
                    let card_number = self.allocator.allocate_next(&CARD_NUMBER_SEQUENCE).await?;
                    allocated = Some(card_number.clone());
                    card_number
                }
            };

            let now = self.clock.now();
            let activation_at = now.checked_add_signed(self.activation_delay).ok_or_else(|| {
                EngineError::internal(format!("activation date out of range for {application_id}"))
            })?;
            let expiry_at = application.expiry_for(activation_at).ok_or_else(|| {
                EngineError::internal(format!("expiry out of range for {application_id}"))
            })?;

            let mut next = application;
            next.activate(card_number.clone(), activation_at, expiry_at, approver.to_string());
            next.updated_at = now;

            match self.applications.replace(next).await? {
                Some(stored) => {
                    info!(
                        target: "parkcard::audit",
                        application_id,
                        card_number = %card_number,
                        approved_by = approver,
                        activation_at = %activation_at,
                        "application approved"
                    );
                    return Ok(ApproveResponse {
                        application_id: stored.application_id,
                        status: stored.status,
                        card_number: stored.card_number,
                    });
                }
                None => debug!(application_id, "approval lost a write race, retrying"),
            }
        }
    }

    /// Moves an application after a payment event, never undoing an approval.
    ///
    /// Returns `None` when the application does not exist.
    pub async fn advance_after_payment(
        &self,
        application_id: &str,
        target: ApplicationStatus,
    ) -> Result<Option<Application>> {
        loop {
            let Some(application) = self.applications.get(application_id).await? else {
                return Ok(None);
            };
            if application.status.has_passed_approval() || application.status == target {
                return Ok(Some(application));
            }

            let previous = application.status;
            let mut next = application;
            next.status = target;
            next.updated_at = self.clock.now();

            if let Some(stored) = self.applications.replace(next).await? {
                info!(
                    target: "parkcard::audit",
                    application_id,
                    from = %previous,
                    to = %target,
                    "application status changed"
                );
                return Ok(Some(stored));
            }
        }
    }

    /// Applies a staff edit to an approved card and returns the stored card.
    pub async fn edit_card(&self, application_id: &str, edit: CardEdit) -> Result<Application> {
        let application_id = application_id.trim();
        if application_id.is_empty() {
            return Err(EngineError::validation("applicationId is required"));
        }
        let edit = edit.check()?;

        loop {
            let application = self
                .applications
                .get(application_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Application not found"))?;
            if !application.status.has_passed_approval() {
                return Err(EngineError::conflict(format!(
                    "Card can be edited only after approval (current: {})",
                    application.status
                )));
            }

            let now = self.clock.now();
            let mut next = application;

            if edit.active_date.is_some() || edit.expiry_date.is_some() {
                let active = edit.active_date.or(next.approved_at);
                let expiry = edit.expiry_date.or(next.expiry_at);
                if let (Some(active), Some(expiry)) = (active, expiry)
                    && active > expiry
                {
                    return Err(EngineError::validation("expiryDate must be after activeDate"));
                }
            }

            if let Some(name) = &edit.name {
                next.name = name.clone();
            }
            if let Some(phone) = &edit.phone {
                next.phone = phone.clone();
            }
            if let Some(vehicle) = &edit.vehicle {
                next.vehicle = vehicle.clone();
            }
            if let Some(status) = edit.status {
                next.status = status;
            }
            if let Some(plan) = &edit.plan {
                next.change_plan(plan.clone());
            }
            if let Some(amount) = edit.amount {
                next.amount = amount;
            }
            if let Some(active_date) = edit.active_date {
                next.approved_at = Some(active_date);
                next.start_date = Some(active_date);
            }
            if let Some(expiry_date) = edit.expiry_date {
                next.expiry_at = Some(expiry_date);
                next.end_date = Some(expiry_date);
            }
            let entry = match edit.extra_alerts {
                Some(extra) => self.ledger.adjust_extra_alerts(
                    &mut next,
                    extra,
                    &edit.reason,
                    &edit.adjusted_by,
                    now,
                )?,
                None => None,
            };
            next.updated_at = now;

            if let Some(stored) = self.applications.replace(next).await? {
                if let Some(entry) = entry {
                    self.ledger.record(entry).await?;
                }
                info!(
                    target: "parkcard::audit",
                    application_id,
                    status = %stored.status,
                    alert_limit = stored.alert_limit,
                    "card edited"
                );
                return Ok(stored);
            }
            debug!(application_id, "card edit lost a write race, retrying");
        }
    }
}
