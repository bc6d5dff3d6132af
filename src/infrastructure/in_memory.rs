use crate::domain::adjustment::QuotaAdjustmentEntry;
use crate::domain::application::Application;
use crate::domain::payment::Payment;
use crate::domain::ports::{
    AdjustmentStore, ApplicationStore, CounterIncrement, CounterStore, PaymentStore,
};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for every engine entity.
///
/// Each entity lives in its own `Arc<RwLock<HashMap<..>>>`. Conditional writes
/// (revision checks, bounded counter increments) run entirely under the write
/// lock, which makes them atomic with respect to every other caller.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    applications: Arc<RwLock<HashMap<String, Application>>>,
    payments: Arc<RwLock<HashMap<String, Payment>>>,
    counters: Arc<RwLock<HashMap<String, u64>>>,
    adjustments: Arc<RwLock<Vec<QuotaAdjustmentEntry>>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn card_taken_by_other(
    applications: &HashMap<String, Application>,
    application: &Application,
) -> bool {
    match application.card_number.as_deref() {
        Some(card) if !card.is_empty() => applications.values().any(|other| {
            other.application_id != application.application_id
                && other.card_number.as_deref() == Some(card)
        }),
        _ => false,
    }
}

#[async_trait]
impl ApplicationStore for InMemoryStore {
    async fn insert(&self, mut application: Application) -> Result<Application> {
        let mut applications = self.applications.write().await;
        if applications.contains_key(&application.application_id) {
            return Err(EngineError::conflict(format!(
                "application {} already exists",
                application.application_id
            )));
        }
        if card_taken_by_other(&applications, &application) {
            return Err(EngineError::conflict("cardNumber is already assigned"));
        }
        application.revision = 1;
        applications.insert(application.application_id.clone(), application.clone());
        Ok(application)
    }

    async fn get(&self, application_id: &str) -> Result<Option<Application>> {
        let applications = self.applications.read().await;
        Ok(applications.get(application_id).cloned())
    }

    async fn find_by_card_number(&self, card_number: &str) -> Result<Vec<Application>> {
        let applications = self.applications.read().await;
        Ok(applications
            .values()
            .filter(|app| app.card_number.as_deref() == Some(card_number))
            .cloned()
            .collect())
    }

    async fn replace(&self, mut application: Application) -> Result<Option<Application>> {
        let mut applications = self.applications.write().await;
        let current_revision = applications
            .get(&application.application_id)
            .map(|stored| stored.revision);
        if current_revision != Some(application.revision) {
            return Ok(None);
        }
        if card_taken_by_other(&applications, &application) {
            return Err(EngineError::conflict("cardNumber is already assigned"));
        }
        application.revision += 1;
        applications.insert(application.application_id.clone(), application.clone());
        Ok(Some(application))
    }

    async fn get_all(&self) -> Result<Vec<Application>> {
        let applications = self.applications.read().await;
        let mut all: Vec<Application> = applications.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn upsert(&self, payment: Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        payments.insert(payment.application_id.clone(), payment);
        Ok(())
    }

    async fn get(&self, application_id: &str) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments.get(application_id).cloned())
    }
}

#[async_trait]
impl CounterStore for InMemoryStore {
    async fn get(&self, name: &str) -> Result<Option<u64>> {
        let counters = self.counters.read().await;
        Ok(counters.get(name).copied())
    }

    async fn create_if_absent(&self, name: &str, seq: u64) -> Result<bool> {
        let mut counters = self.counters.write().await;
        if counters.contains_key(name) {
            return Ok(false);
        }
        counters.insert(name.to_string(), seq);
        Ok(true)
    }

    async fn increment_below(&self, name: &str, ceiling: u64) -> Result<CounterIncrement> {
        let mut counters = self.counters.write().await;
        let Some(seq) = counters.get_mut(name) else {
            return Ok(CounterIncrement::Missing);
        };
        if *seq >= ceiling {
            return Ok(CounterIncrement::AtCeiling(*seq));
        }
        *seq += 1;
        Ok(CounterIncrement::Advanced(*seq))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut counters = self.counters.write().await;
        counters.remove(name);
        Ok(())
    }
}

#[async_trait]
impl AdjustmentStore for InMemoryStore {
    async fn append(&self, entry: QuotaAdjustmentEntry) -> Result<()> {
        let mut adjustments = self.adjustments.write().await;
        adjustments.push(entry);
        Ok(())
    }

    async fn list_for(&self, application_id: &str) -> Result<Vec<QuotaAdjustmentEntry>> {
        let adjustments = self.adjustments.read().await;
        Ok(adjustments
            .iter()
            .filter(|entry| entry.application_id == application_id)
            .cloned()
            .collect())
    }
}
