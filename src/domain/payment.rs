use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Separates the application id from the attempt timestamp in merchant transaction ids.
pub const MERCHANT_TRANSACTION_MARKER: &str = "-TXN-";

/// A positive charge amount in currency units, rounded to paise precision.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount {
    value: Decimal,
    paise: i64,
}

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(EngineError::validation("amount must be a positive number"));
        }
        let rounded = value.round_dp(2);
        let paise = rounded
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|paise| paise.to_i64())
            .filter(|paise| *paise > 0)
            .ok_or_else(|| EngineError::validation("amount must be at least 0.01"))?;
        Ok(Self {
            value: rounded,
            paise,
        })
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn in_paise(&self) -> i64 {
        self.paise
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = EngineError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    /// Maps the gateway's `code`/`state` vocabulary onto the internal tri-state.
    ///
    /// Explicit success wins, then anything pending; every other value,
    /// including codes never seen before, counts as a failure.
    pub fn from_gateway(code: &str, state: &str) -> Self {
        let code = code.trim().to_uppercase();
        let state = state.trim().to_uppercase();

        if matches!(code.as_str(), "PAYMENT_SUCCESS" | "SUCCESS")
            || matches!(state.as_str(), "COMPLETED" | "SUCCESS")
        {
            Self::Success
        } else if code.contains("PENDING") || state == "PENDING" {
            Self::Pending
        } else {
            Self::Failed
        }
    }
}

/// The single live payment record of an application.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub application_id: String,
    pub merchant_transaction_id: String,
    pub phone_pe_transaction_id: Option<String>,
    pub amount: Decimal,
    pub amount_in_paise: i64,
    pub status: PaymentStatus,
    pub payment_url: Option<String>,
    /// Raw (decoded) gateway notification, kept for support and audits.
    pub webhook_response: Option<serde_json::Value>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A fresh pending attempt.
    pub fn pending(
        application_id: &str,
        merchant_transaction_id: String,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            application_id: application_id.to_string(),
            merchant_transaction_id,
            phone_pe_transaction_id: None,
            amount: amount.value(),
            amount_in_paise: amount.in_paise(),
            status: PaymentStatus::Pending,
            payment_url: None,
            webhook_response: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Builds the per-attempt correlation id `<applicationId>-TXN-<unix millis>`.
pub fn merchant_transaction_id(application_id: &str, now: DateTime<Utc>) -> String {
    format!(
        "{application_id}{MERCHANT_TRANSACTION_MARKER}{}",
        now.timestamp_millis()
    )
}

/// Recovers the application id from a merchant transaction id.
///
/// Ids without the marker are returned unchanged.
pub fn application_id_from_merchant_transaction_id(merchant_transaction_id: &str) -> String {
    let id = merchant_transaction_id.trim();
    match id.find(MERCHANT_TRANSACTION_MARKER) {
        Some(index) => id[..index].to_string(),
        None => id.to_string(),
    }
}
