use super::adjustment::QuotaAdjustmentEntry;
use super::application::Application;
use super::payment::Payment;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Inserts a new application; fails with a conflict if the id is taken.
    async fn insert(&self, application: Application) -> Result<Application>;
    async fn get(&self, application_id: &str) -> Result<Option<Application>>;
    async fn find_by_card_number(&self, card_number: &str) -> Result<Vec<Application>>;
    /// Conditional write: stores `application` only if the stored revision
    /// still equals `application.revision`.
    ///
    /// Returns the stored copy with its revision bumped, or `None` when another
    /// writer got there first. Fails with a conflict if the card number is
    /// already held by a different application.
    async fn replace(&self, application: Application) -> Result<Option<Application>>;
    async fn get_all(&self) -> Result<Vec<Application>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts or overwrites the payment keyed by its application id.
    async fn upsert(&self, payment: Payment) -> Result<()>;
    async fn get(&self, application_id: &str) -> Result<Option<Payment>>;
}

/// Outcome of a bounded counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterIncrement {
    Advanced(u64),
    /// The counter already sits at the ceiling and was left untouched.
    AtCeiling(u64),
    Missing,
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<u64>>;
    /// Creates the counter with `seq` unless it exists. Returns whether it was created.
    async fn create_if_absent(&self, name: &str, seq: u64) -> Result<bool>;
    /// Atomically adds one when the current value is below `ceiling`.
    async fn increment_below(&self, name: &str, ceiling: u64) -> Result<CounterIncrement>;
    async fn delete(&self, name: &str) -> Result<()>;
}

#[async_trait]
pub trait AdjustmentStore: Send + Sync {
    async fn append(&self, entry: QuotaAdjustmentEntry) -> Result<()>;
    /// Entries for one application, oldest first.
    async fn list_for(&self, application_id: &str) -> Result<Vec<QuotaAdjustmentEntry>>;
}

/// What the gateway needs to open a pay page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayPageRequest {
    pub application_id: String,
    pub merchant_transaction_id: String,
    pub amount_in_paise: i64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("PhonePe pay API request failed")]
    Transport(String),
    #[error("{}", .message.as_deref().unwrap_or("PhonePe payment initialization failed"))]
    Rejected { status: u16, message: Option<String> },
    #[error("PhonePe response missing paymentUrl")]
    MissingRedirect,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a pay page and returns the URL the payer must be redirected to.
    async fn open_pay_page(&self, request: &PayPageRequest) -> std::result::Result<String, GatewayError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type ApplicationStoreRef = Arc<dyn ApplicationStore>;
pub type PaymentStoreRef = Arc<dyn PaymentStore>;
pub type CounterStoreRef = Arc<dyn CounterStore>;
pub type AdjustmentStoreRef = Arc<dyn AdjustmentStore>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type ClockRef = Arc<dyn Clock>;

/// The store handles one engine instance works against.
#[derive(Clone)]
pub struct Stores {
    pub applications: ApplicationStoreRef,
    pub payments: PaymentStoreRef,
    pub counters: CounterStoreRef,
    pub adjustments: AdjustmentStoreRef,
}

impl Stores {
    /// Uses one backend for every entity.
    pub fn from_backend<S>(backend: S) -> Self
    where
        S: ApplicationStore + PaymentStore + CounterStore + AdjustmentStore + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            applications: backend.clone(),
            payments: backend.clone(),
            counters: backend.clone(),
            adjustments: backend,
        }
    }
}
