//! One-off data repairs run from the command line.

use crate::application::allocator::SequenceAllocator;
use crate::domain::application::Application;
use crate::domain::ports::{ApplicationStoreRef, ClockRef, CounterStoreRef};
use crate::domain::sequence::CARD_NUMBER_SEQUENCE;
use crate::error::{EngineError, Result};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub legacy_counter: bool,
    pub card_number_counter_created: bool,
    pub applications_matched: usize,
    pub applications_modified: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub scanned: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub migration: MigrationReport,
    pub backfill: BackfillReport,
}

#[derive(Clone)]
pub struct Maintenance {
    applications: ApplicationStoreRef,
    counters: CounterStoreRef,
    allocator: SequenceAllocator,
    clock: ClockRef,
}

impl Maintenance {
    pub fn new(
        applications: ApplicationStoreRef,
        counters: CounterStoreRef,
        allocator: SequenceAllocator,
        clock: ClockRef,
    ) -> Self {
        Self {
            applications,
            counters,
            allocator,
            clock,
        }
    }

    /// Rewrites `application` through `repair` until the conditional write
    /// lands. Returns whether anything was written.
    async fn rewrite<F>(&self, application: Application, repair: F) -> Result<bool>
    where
        F: Fn(&mut Application) -> bool,
    {
        let mut current = application;
        loop {
            let mut next = current.clone();
            if !repair(&mut next) {
                return Ok(false);
            }
            next.updated_at = self.clock.now();
            if self.applications.replace(next).await?.is_some() {
                return Ok(true);
            }
            current = self
                .applications
                .get(&current.application_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Application not found"))?;
        }
    }

    /// Moves cards issued under the old numbering field onto `cardNumber` and
    /// retires the legacy counter.
    pub async fn migrate_legacy_card_ids(&self) -> Result<MigrationReport> {
        let legacy_counter = match CARD_NUMBER_SEQUENCE.legacy_name {
            Some(name) => self.counters.get(name).await?.is_some(),
            None => false,
        };
        let card_number_counter_created =
            self.allocator.ensure_initialized(&CARD_NUMBER_SEQUENCE).await?;

        let mut report = MigrationReport {
            legacy_counter,
            card_number_counter_created,
            ..MigrationReport::default()
        };

        for application in self.applications.get_all().await? {
            if application
                .legacy_card_id
                .as_deref()
                .is_none_or(|id| id.trim().is_empty())
            {
                continue;
            }
            report.applications_matched += 1;

            let application_id = application.application_id.clone();
            let written = self
                .rewrite(application, |app| {
                    let Some(legacy) = app.legacy_card_id.take() else {
                        return false;
                    };
                    if app.card_number.as_deref().is_none_or(str::is_empty) {
                        app.card_number = Some(legacy.trim().to_string());
                    }
                    true
                })
                .await;
            match written {
                Ok(true) => report.applications_modified += 1,
                Ok(false) => {}
                Err(EngineError::ConflictError(message)) => {
                    warn!(application_id, %message, "legacy card id collides, left in place");
                }
                Err(err) => return Err(err),
            }
        }

        if let Some(legacy) = CARD_NUMBER_SEQUENCE.legacy_name
            && let Err(error) = self.counters.delete(legacy).await
        {
            warn!(sequence = legacy, %error, "failed to remove legacy counter");
        }

        info!(
            matched = report.applications_matched,
            modified = report.applications_modified,
            "legacy card ids migrated"
        );
        Ok(report)
    }

    /// Re-derives every application's allowance from the plan catalogue,
    /// keeping usage and extra grants as they are.
    pub async fn backfill_alert_limits(&self) -> Result<BackfillReport> {
        let mut report = BackfillReport::default();

        for application in self.applications.get_all().await? {
            report.scanned += 1;
            let written = self
                .rewrite(application, |app| {
                    let before = (
                        app.base_alert_limit,
                        app.alert_limit,
                        app.alerts_left,
                        app.plan_display.clone(),
                        app.start_date,
                        app.end_date,
                    );
                    app.change_plan(app.plan.clone());
                    app.start_date = app.start_date.or(app.approved_at);
                    app.end_date = app.end_date.or(app.expiry_at);
                    before
                        != (
                            app.base_alert_limit,
                            app.alert_limit,
                            app.alerts_left,
                            app.plan_display.clone(),
                            app.start_date,
                            app.end_date,
                        )
                })
                .await?;
            if written {
                report.updated += 1;
            }
        }

        info!(scanned = report.scanned, updated = report.updated, "alert limits backfilled");
        Ok(report)
    }

    pub async fn run_all(&self) -> Result<MaintenanceReport> {
        Ok(MaintenanceReport {
            migration: self.migrate_legacy_card_ids().await?,
            backfill: self.backfill_alert_limits().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::application::{ApplicantProfile, ApplicationStatus, Validity};
    use crate::domain::plan::PlanCode;
    use crate::domain::ports::{ApplicationStore, CounterStore};
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::in_memory::InMemoryStore;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn maintenance(store: &Arc<InMemoryStore>) -> Maintenance {
        Maintenance::new(
            store.clone(),
            store.clone(),
            SequenceAllocator::new(store.clone()),
            Arc::new(SystemClock),
        )
    }

    fn application(id: &str, plan: &str) -> Application {
        Application::new(
            id.to_string(),
            ApplicantProfile {
                name: "Ira".to_string(),
                email: "ira@example.com".to_string(),
                phone: "9000000002".to_string(),
                vehicle: "GJ01XY0001".to_string(),
            },
            PlanCode::new(plan),
            dec!(99),
            Validity::TwelveMonths,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_migrate_copies_legacy_ids() {
        let store = Arc::new(InMemoryStore::new());
        store.create_if_absent("cardId", 310).await.unwrap();

        let mut legacy = application("APP-LEGACY", "INDIVIDUAL");
        legacy.status = ApplicationStatus::Active;
        legacy.legacy_card_id = Some("0310".to_string());
        store.insert(legacy).await.unwrap();
        store.insert(application("APP-NEW", "INDIVIDUAL")).await.unwrap();

        let report = maintenance(&store).migrate_legacy_card_ids().await.unwrap();
        assert!(report.legacy_counter);
        assert!(report.card_number_counter_created);
        assert_eq!(report.applications_matched, 1);
        assert_eq!(report.applications_modified, 1);

        let migrated = ApplicationStore::get(store.as_ref(), "APP-LEGACY").await.unwrap().unwrap();
        assert_eq!(migrated.card_number.as_deref(), Some("0310"));
        assert_eq!(migrated.legacy_card_id, None);
        assert_eq!(CounterStore::get(store.as_ref(), "cardNumber").await.unwrap(), Some(310));
        assert_eq!(CounterStore::get(store.as_ref(), "cardId").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_backfill_restores_allowance() {
        let store = Arc::new(InMemoryStore::new());
        let mut stale = application("APP-STALE", "PRIME");
        stale.base_alert_limit = 10;
        stale.extra_alerts_granted = 2;
        stale.alert_used = 4;
        stale.alert_limit = 10;
        stale.alerts_left = 6;
        stale.plan_display = String::new();
        store.insert(stale).await.unwrap();
        store.insert(application("APP-OK", "INDIVIDUAL")).await.unwrap();

        let report = maintenance(&store).backfill_alert_limits().await.unwrap();
        assert_eq!(report, BackfillReport { scanned: 2, updated: 1 });

        let fixed = ApplicationStore::get(store.as_ref(), "APP-STALE").await.unwrap().unwrap();
        assert_eq!(fixed.base_alert_limit, 15);
        assert_eq!(fixed.alert_limit, 17);
        assert_eq!(fixed.alerts_left, 13);
        assert_eq!(fixed.alert_used, 4);
        assert_eq!(fixed.plan_display, "PRIME");
    }
}
