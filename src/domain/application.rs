use chrono::{DateTime, FixedOffset, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::plan::PlanCode;

/// Lifecycle state of an application and, after approval, of its card.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Initiated,
    PaymentPending,
    PaidPendingApproval,
    // Early records were written with a lowercase status.
    #[serde(alias = "active")]
    Active,
    Inactive,
    Suspended,
    Expired,
    Rejected,
}

impl ApplicationStatus {
    /// True once the application has been approved at least once, i.e. it owns a card.
    pub fn has_passed_approval(self) -> bool {
        matches!(
            self,
            Self::Active | Self::Inactive | Self::Suspended | Self::Expired
        )
    }

    /// Parses the statuses staff may assign from the card editor.
    pub fn parse_card_status(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "ACTIVE" => Some(Self::Active),
            "INACTIVE" => Some(Self::Inactive),
            "SUSPENDED" => Some(Self::Suspended),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "INITIATED",
            Self::PaymentPending => "PAYMENT_PENDING",
            Self::PaidPendingApproval => "PAID_PENDING_APPROVAL",
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::Expired => "EXPIRED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription validity chosen at application time.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(from = "u32", into = "u32")]
pub enum Validity {
    SixMonths,
    #[default]
    TwelveMonths,
}

impl Validity {
    /// Anything other than 6 resolves to the twelve month default.
    pub fn from_months(months: Option<u32>) -> Self {
        match months {
            Some(6) => Self::SixMonths,
            _ => Self::TwelveMonths,
        }
    }

    pub fn months(self) -> u32 {
        match self {
            Self::SixMonths => 6,
            Self::TwelveMonths => 12,
        }
    }
}

impl From<u32> for Validity {
    fn from(months: u32) -> Self {
        Self::from_months(Some(months))
    }
}

impl From<Validity> for u32 {
    fn from(validity: Validity) -> Self {
        validity.months()
    }
}

/// Applicant contact and vehicle details, already trimmed.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ApplicantProfile {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub vehicle: String,
}

/// One subscription request, from submission through approval to an issued card.
///
/// Quota fields obey `alert_used <= alert_limit` and
/// `alert_limit == base_alert_limit + extra_alerts_granted`; every mutator below
/// keeps `alerts_left` in step.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub application_id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub vehicle: String,
    pub plan: PlanCode,
    pub plan_display: String,
    pub validity_months: Validity,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
    /// Card identifier written by the previous numbering scheme. Only read by
    /// the one-time migration; lookups use `card_number`.
    #[serde(
        default,
        rename = "cardId",
        skip_serializing_if = "Option::is_none"
    )]
    pub legacy_card_id: Option<String>,
    pub base_alert_limit: u32,
    pub extra_alerts_granted: u32,
    #[serde(default)]
    pub extra_alerts_reason: String,
    #[serde(default)]
    pub extra_alerts_granted_by: String,
    #[serde(default)]
    pub extra_alerts_granted_at: Option<DateTime<Utc>>,
    pub alert_limit: u32,
    pub alert_used: u32,
    pub alerts_left: u32,
    pub status: ApplicationStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub expiry_at: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Version used for conditional writes; managed by the store.
    #[serde(default)]
    pub revision: u64,
}

impl Application {
    pub fn new(
        application_id: String,
        profile: ApplicantProfile,
        plan: PlanCode,
        amount: Decimal,
        validity: Validity,
        now: DateTime<Utc>,
    ) -> Self {
        let base = plan.base_alert_limit();
        Self {
            application_id,
            name: profile.name,
            email: profile.email,
            phone: profile.phone,
            vehicle: profile.vehicle,
            plan_display: plan.display(),
            plan,
            validity_months: validity,
            amount,
            card_number: None,
            legacy_card_id: None,
            base_alert_limit: base,
            extra_alerts_granted: 0,
            extra_alerts_reason: String::new(),
            extra_alerts_granted_by: String::new(),
            extra_alerts_granted_at: None,
            alert_limit: base,
            alert_used: 0,
            alerts_left: base,
            status: ApplicationStatus::Initiated,
            approved_at: None,
            approved_by: None,
            expiry_at: None,
            start_date: None,
            end_date: None,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    /// Recomputes the effective cap and the remainder from their operands.
    pub fn recompute_alerts(&mut self) {
        self.alert_limit = self.base_alert_limit + self.extra_alerts_granted;
        self.alerts_left = self.alert_limit.saturating_sub(self.alert_used);
    }

    /// Switches plan, re-deriving the base allowance without touching usage.
    pub fn change_plan(&mut self, plan: PlanCode) {
        self.base_alert_limit = plan.base_alert_limit();
        self.plan_display = plan.display();
        self.plan = plan;
        self.recompute_alerts();
    }

    pub fn grant_extra_alerts(
        &mut self,
        extra: u32,
        reason: String,
        granted_by: String,
        now: DateTime<Utc>,
    ) {
        self.extra_alerts_granted = extra;
        self.extra_alerts_reason = reason;
        self.extra_alerts_granted_by = granted_by;
        self.extra_alerts_granted_at = Some(now);
        self.recompute_alerts();
    }

    /// Activation moment plus the chosen validity, in calendar months.
    pub fn expiry_for(&self, activation_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        activation_at.checked_add_months(Months::new(self.validity_months.months()))
    }

    /// Marks the application approved with a freshly issued card.
    pub fn activate(
        &mut self,
        card_number: String,
        activation_at: DateTime<Utc>,
        expiry_at: DateTime<Utc>,
        approved_by: String,
    ) {
        self.card_number = Some(card_number);
        self.plan_display = self.plan.display();
        self.base_alert_limit = self.plan.base_alert_limit();
        self.recompute_alerts();
        self.status = ApplicationStatus::Active;
        self.approved_at = Some(activation_at);
        self.start_date = Some(activation_at);
        self.expiry_at = Some(expiry_at);
        self.end_date = Some(expiry_at);
        self.approved_by = Some(approved_by);
    }

    /// True while the activation date is still ahead on the local calendar.
    pub fn activation_pending(&self, now: DateTime<Utc>, offset: FixedOffset) -> bool {
        self.approved_at.is_some_and(|approved_at| {
            approved_at.with_timezone(&offset).date_naive()
                > now.with_timezone(&offset).date_naive()
        })
    }

    /// Checks whether one more alert may be consumed right now.
    pub fn alert_eligibility(
        &self,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Result<(), NotEligible> {
        if self.status != ApplicationStatus::Active {
            return Err(NotEligible::UnknownCard);
        }
        if self.alert_limit == 0 {
            return Err(NotEligible::NoAllowance);
        }
        if self.alert_used >= self.alert_limit {
            return Err(NotEligible::QuotaExhausted);
        }
        if self.activation_pending(now, offset) {
            return Err(NotEligible::NotYetActive);
        }
        Ok(())
    }

    /// Spends one alert. Callers must have checked [`Self::alert_eligibility`].
    pub fn consume_alert(&mut self) {
        self.alert_used += 1;
        self.recompute_alerts();
    }
}

/// Why an alert lookup produced no dialable number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotEligible {
    EmptyToken,
    UnknownCard,
    NoAllowance,
    QuotaExhausted,
    NotYetActive,
    /// The alert was consumed but the stored phone could not be dialled.
    UndialablePhone,
}

/// Result of consuming one alert against a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    Dispatched { phone: String },
    NotEligible(NotEligible),
}
