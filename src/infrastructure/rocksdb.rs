use crate::domain::adjustment::QuotaAdjustmentEntry;
use crate::domain::application::Application;
use crate::domain::payment::Payment;
use crate::domain::ports::{
    AdjustmentStore, ApplicationStore, CounterIncrement, CounterStore, PaymentStore,
};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Column Family for application documents, keyed by application id.
pub const CF_APPLICATIONS: &str = "applications";
/// Column Family for payment documents, keyed by application id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for named sequence counters.
pub const CF_COUNTERS: &str = "counters";
/// Column Family for the append-only quota adjustment ledger.
pub const CF_ADJUSTMENTS: &str = "adjustments";
/// Column Family mapping each issued card number to its application id.
pub const CF_CARD_NUMBERS: &str = "card_numbers";

const COLUMN_FAMILIES: [&str; 5] = [
    CF_APPLICATIONS,
    CF_PAYMENTS,
    CF_COUNTERS,
    CF_ADJUSTMENTS,
    CF_CARD_NUMBERS,
];

/// A persistent store implementation using RocksDB.
///
/// Every entity lives in its own Column Family as JSON. RocksDB has no
/// conditional put, so every read-compare-write runs under `write_lock`; plain
/// reads never take it. Application writes update the card number index in
/// the same batch.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that all column families exist, and builds the card number
    /// index when it is missing from an older database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let store = Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        };
        store.rebuild_card_index_if_empty()?;
        Ok(store)
    }

    fn rebuild_card_index_if_empty(&self) -> Result<()> {
        let index = self.cf(CF_CARD_NUMBERS)?;
        if self.db.iterator_cf(index, IteratorMode::Start).next().is_some() {
            return Ok(());
        }

        let mut batch = WriteBatch::default();
        let mut indexed = 0usize;
        for application in self.scan::<Application>(CF_APPLICATIONS, b"")? {
            if let Some(card) = issued_card(&application) {
                batch.put_cf(index, card.as_bytes(), application.application_id.as_bytes());
                indexed += 1;
            }
        }
        if indexed > 0 {
            self.db.write(batch)?;
            info!(indexed, "card number index rebuilt");
        }
        Ok(())
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| EngineError::internal(format!("{name} column family not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(self.cf(cf)?, key, bytes)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let handle = self.cf(cf)?;
        let mut values = Vec::new();
        let iter = self
            .db
            .iterator_cf(handle, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }

        Ok(values)
    }

    fn card_owner(&self, card_number: &str) -> Result<Option<String>> {
        match self.db.get_cf(self.cf(CF_CARD_NUMBERS)?, card_number.as_bytes())? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }

    fn card_taken_by_other(&self, application: &Application) -> Result<bool> {
        let Some(card) = issued_card(application) else {
            return Ok(false);
        };
        Ok(self
            .card_owner(card)?
            .is_some_and(|owner| owner != application.application_id))
    }

    /// Writes the application and moves its card number index entry in one
    /// batch. Callers hold `write_lock`.
    fn write_application(
        &self,
        application: &Application,
        previous: Option<&Application>,
    ) -> Result<()> {
        let index = self.cf(CF_CARD_NUMBERS)?;
        let key = application.application_id.as_bytes();
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_APPLICATIONS)?, key, serde_json::to_vec(application)?);

        let card = issued_card(application);
        if let Some(old) = previous.and_then(issued_card)
            && Some(old) != card
        {
            batch.delete_cf(index, old.as_bytes());
        }
        if let Some(card) = card {
            batch.put_cf(index, card.as_bytes(), key);
        }

        self.db.write(batch)?;
        Ok(())
    }
}

fn issued_card(application: &Application) -> Option<&str> {
    application.card_number.as_deref().filter(|card| !card.is_empty())
}

fn adjustment_key(entry: &QuotaAdjustmentEntry) -> Vec<u8> {
    format!(
        "{}\u{0}{:020}{}",
        entry.application_id,
        entry.recorded_at.timestamp_micros(),
        entry.entry_id
    )
    .into_bytes()
}

#[async_trait]
impl ApplicationStore for RocksDBStore {
    async fn insert(&self, mut application: Application) -> Result<Application> {
        let _guard = self.write_lock.lock().await;
        let key = application.application_id.as_bytes();
        if self.db.get_pinned_cf(self.cf(CF_APPLICATIONS)?, key)?.is_some() {
            return Err(EngineError::conflict(format!(
                "application {} already exists",
                application.application_id
            )));
        }
        if self.card_taken_by_other(&application)? {
            return Err(EngineError::conflict("cardNumber is already assigned"));
        }
        application.revision = 1;
        self.write_application(&application, None)?;
        Ok(application)
    }

    async fn get(&self, application_id: &str) -> Result<Option<Application>> {
        self.read(CF_APPLICATIONS, application_id.as_bytes())
    }

    async fn find_by_card_number(&self, card_number: &str) -> Result<Vec<Application>> {
        let Some(owner) = self.card_owner(card_number)? else {
            return Ok(Vec::new());
        };
        let application: Option<Application> = self.read(CF_APPLICATIONS, owner.as_bytes())?;
        Ok(application
            .filter(|app| app.card_number.as_deref() == Some(card_number))
            .into_iter()
            .collect())
    }

    async fn replace(&self, mut application: Application) -> Result<Option<Application>> {
        let _guard = self.write_lock.lock().await;
        let key = application.application_id.as_bytes();
        let stored: Option<Application> = self.read(CF_APPLICATIONS, key)?;
        let Some(stored) = stored.filter(|s| s.revision == application.revision) else {
            return Ok(None);
        };
        if self.card_taken_by_other(&application)? {
            return Err(EngineError::conflict("cardNumber is already assigned"));
        }
        application.revision += 1;
        self.write_application(&application, Some(&stored))?;
        Ok(Some(application))
    }

    async fn get_all(&self) -> Result<Vec<Application>> {
        let mut all: Vec<Application> = self.scan(CF_APPLICATIONS, b"")?;
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn upsert(&self, payment: Payment) -> Result<()> {
        self.write(CF_PAYMENTS, payment.application_id.as_bytes(), &payment)
    }

    async fn get(&self, application_id: &str) -> Result<Option<Payment>> {
        self.read(CF_PAYMENTS, application_id.as_bytes())
    }
}

#[async_trait]
impl CounterStore for RocksDBStore {
    async fn get(&self, name: &str) -> Result<Option<u64>> {
        self.read(CF_COUNTERS, name.as_bytes())
    }

    async fn create_if_absent(&self, name: &str, seq: u64) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        if self.read::<u64>(CF_COUNTERS, name.as_bytes())?.is_some() {
            return Ok(false);
        }
        self.write(CF_COUNTERS, name.as_bytes(), &seq)?;
        Ok(true)
    }

    async fn increment_below(&self, name: &str, ceiling: u64) -> Result<CounterIncrement> {
        let _guard = self.write_lock.lock().await;
        let Some(seq) = self.read::<u64>(CF_COUNTERS, name.as_bytes())? else {
            return Ok(CounterIncrement::Missing);
        };
        if seq >= ceiling {
            return Ok(CounterIncrement::AtCeiling(seq));
        }
        let next = seq + 1;
        self.write(CF_COUNTERS, name.as_bytes(), &next)?;
        Ok(CounterIncrement::Advanced(next))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.db.delete_cf(self.cf(CF_COUNTERS)?, name.as_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl AdjustmentStore for RocksDBStore {
    async fn append(&self, entry: QuotaAdjustmentEntry) -> Result<()> {
        self.write(CF_ADJUSTMENTS, &adjustment_key(&entry), &entry)
    }

    async fn list_for(&self, application_id: &str) -> Result<Vec<QuotaAdjustmentEntry>> {
        let prefix = format!("{application_id}\u{0}");
        self.scan(CF_ADJUSTMENTS, prefix.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::application::{ApplicantProfile, Validity};
    use crate::domain::plan::PlanCode;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn application(id: &str) -> Application {
        Application::new(
            id.to_string(),
            ApplicantProfile {
                name: "Meera".to_string(),
                email: "meera@example.com".to_string(),
                phone: "9123456780".to_string(),
                vehicle: "MH12XY9876".to_string(),
            },
            PlanCode::new("PREMIUM"),
            dec!(499),
            Validity::SixMonths,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_application_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let stored = store.insert(application("APP-1")).await.unwrap();
        let retrieved = ApplicationStore::get(&store, "APP-1").await.unwrap().unwrap();
        assert_eq!(retrieved, stored);

        let mut stale = stored.clone();
        let mut next = stored;
        next.card_number = Some("0100".to_string());
        assert!(store.replace(next).await.unwrap().is_some());

        stale.alert_used = 3;
        assert!(store.replace(stale).await.unwrap().is_none());

        let by_card = store.find_by_card_number("0100").await.unwrap();
        assert_eq!(by_card.len(), 1);
        assert_eq!(ApplicationStore::get_all(&store).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_card_index_follows_edits() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let mut first = application("APP-1");
        first.card_number = Some("0100".to_string());
        let first = store.insert(first).await.unwrap();
        let mut second = application("APP-2");
        second.card_number = Some("0101".to_string());
        let second = store.insert(second).await.unwrap();

        let mut moved = first;
        moved.card_number = Some("0150".to_string());
        let moved = store.replace(moved).await.unwrap().unwrap();

        assert!(store.find_by_card_number("0100").await.unwrap().is_empty());
        let by_card = store.find_by_card_number("0150").await.unwrap();
        assert_eq!(by_card.len(), 1);
        assert_eq!(by_card[0].application_id, "APP-1");

        let mut duplicate = second;
        duplicate.card_number = Some("0150".to_string());
        assert!(matches!(
            store.replace(duplicate).await,
            Err(EngineError::ConflictError(_))
        ));
        assert_eq!(
            store.find_by_card_number("0101").await.unwrap()[0].application_id,
            "APP-2"
        );

        // The freed number can be taken by another application.
        let mut third = application("APP-3");
        third.card_number = Some("0100".to_string());
        store.insert(third).await.unwrap();
        assert_eq!(moved.card_number.as_deref(), Some("0150"));
        assert_eq!(
            store.find_by_card_number("0100").await.unwrap()[0].application_id,
            "APP-3"
        );
    }

    #[tokio::test]
    async fn test_rocksdb_card_index_rebuilt_on_open() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            let mut issued = application("APP-1");
            issued.card_number = Some("0100".to_string());
            store.insert(issued).await.unwrap();
            let index = store.cf(CF_CARD_NUMBERS).unwrap();
            store.db.delete_cf(index, b"0100").unwrap();
            assert!(store.find_by_card_number("0100").await.unwrap().is_empty());
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        let by_card = store.find_by_card_number("0100").await.unwrap();
        assert_eq!(by_card.len(), 1);
        assert_eq!(by_card[0].application_id, "APP-1");
    }

    #[tokio::test]
    async fn test_rocksdb_counter_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        assert!(store.create_if_absent("cardNumber", 9998).await.unwrap());
        assert_eq!(
            store.increment_below("cardNumber", 9999).await.unwrap(),
            CounterIncrement::Advanced(9999)
        );
        assert_eq!(
            store.increment_below("cardNumber", 9999).await.unwrap(),
            CounterIncrement::AtCeiling(9999)
        );

        store.delete("cardNumber").await.unwrap();
        assert!(CounterStore::get(&store, "cardNumber").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_adjustments_are_scoped_by_application() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let now = Utc::now();

        for (app, new) in [("APP-1", 2), ("APP-10", 4), ("APP-1", 5)] {
            let entry =
                QuotaAdjustmentEntry::for_change(app, "0100", 0, new, "support", "ops", now)
                    .unwrap();
            store.append(entry).await.unwrap();
        }

        let entries = store.list_for("APP-1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.application_id == "APP-1"));
    }
}
