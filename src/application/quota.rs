use crate::domain::application::{AlertOutcome, ApplicationStatus, NotEligible};
use crate::domain::phone::dialable_phone;
use crate::domain::ports::{ApplicationStoreRef, ClockRef};
use crate::error::{EngineError, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitLookupResponse {
    pub mobile: String,
}

/// Spends alert credits, one per lookup, without ever exceeding the cap.
#[derive(Clone)]
pub struct AlertQuotaLedger {
    applications: ApplicationStoreRef,
    clock: ClockRef,
    local_offset: FixedOffset,
    fallback_number: String,
}

impl AlertQuotaLedger {
    pub fn new(
        applications: ApplicationStoreRef,
        clock: ClockRef,
        local_offset: FixedOffset,
        fallback_number: String,
    ) -> Self {
        Self {
            applications,
            clock,
            local_offset,
            fallback_number,
        }
    }

    /// Consumes one alert from the active card printed with `card_token`.
    ///
    /// The increment is a conditional write on the revision that was checked.
    /// When another caller wins the race the card is re-read and re-checked,
    /// so `alert_used` can never pass `alert_limit`.
    pub async fn consume_one_alert(&self, card_token: &str) -> Result<AlertOutcome> {
        let token = card_token.trim();
        if token.is_empty() {
            return Ok(AlertOutcome::NotEligible(NotEligible::EmptyToken));
        }

        loop {
            let Some(card) = self
                .applications
                .find_by_card_number(token)
                .await?
                .into_iter()
                .find(|app| app.status == ApplicationStatus::Active)
            else {
                return Ok(AlertOutcome::NotEligible(NotEligible::UnknownCard));
            };

            let now = self.clock.now();
            if let Err(reason) = card.alert_eligibility(now, self.local_offset) {
                debug!(card_number = token, ?reason, "alert not eligible");
                return Ok(AlertOutcome::NotEligible(reason));
            }

            let mut next = card;
            next.consume_alert();
            next.updated_at = now;

            let Some(stored) = self.applications.replace(next).await? else {
                debug!(card_number = token, "alert consumption lost a write race, retrying");
                continue;
            };

            info!(
                target: "parkcard::audit",
                application_id = %stored.application_id,
                card_number = token,
                alert_used = stored.alert_used,
                alerts_left = stored.alerts_left,
                "alert consumed"
            );

            // The credit stays spent even if the stored phone cannot be dialled.
            return Ok(match dialable_phone(&stored.phone) {
                Some(phone) => AlertOutcome::Dispatched { phone },
                None => {
                    warn!(
                        application_id = %stored.application_id,
                        "alert consumed but stored phone is not dialable"
                    );
                    AlertOutcome::NotEligible(NotEligible::UndialablePhone)
                }
            });
        }
    }

    /// Telephony lookup: the number to dial for the keyed-in digits.
    ///
    /// Always answers with something dialable; every miss and every internal
    /// failure turns into the fallback number.
    pub async fn ivr_lookup(&self, raw_digits: &str) -> String {
        let digits = raw_digits.replace('"', "");
        match self.consume_one_alert(digits.trim()).await {
            Ok(AlertOutcome::Dispatched { phone }) => phone,
            Ok(AlertOutcome::NotEligible(_)) => self.fallback_number.clone(),
            Err(err) => {
                error!(error = %err, "ivr lookup failed");
                self.fallback_number.clone()
            }
        }
    }

    /// Read-only lookup of the phone behind a 4-digit card suffix.
    pub async fn resolve_card_phone(&self, digit: &str) -> Result<DigitLookupResponse> {
        let digit = digit.trim();
        if digit.len() != 4 || !digit.chars().all(|c| c.is_ascii_digit()) {
            return Err(EngineError::validation("digit must be exactly 4 numbers"));
        }

        let mut matches: Vec<_> = self
            .applications
            .get_all()
            .await?
            .into_iter()
            .filter(|app| {
                app.status == ApplicationStatus::Active
                    && app
                        .card_number
                        .as_deref()
                        .is_some_and(|card| card.ends_with(digit))
            })
            .collect();

        match matches.len() {
            0 => Err(EngineError::not_found("digit not found or not active")),
            1 => Ok(DigitLookupResponse {
                mobile: matches.remove(0).phone,
            }),
            _ => Err(EngineError::conflict("multiple active records for this digit")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::application::{ApplicantProfile, Application, Validity};
    use crate::domain::plan::PlanCode;
    use crate::domain::ports::ApplicationStore;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::InMemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const FALLBACK: &str = "+918750920902";

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 10, 6, 0, 0).unwrap()
    }

    async fn active_card(store: &InMemoryStore, card: &str, phone: &str, used: u32) -> Application {
        let mut app = Application::new(
            format!("APP-{card}"),
            ApplicantProfile {
                name: "Dev".to_string(),
                email: "dev@example.com".to_string(),
                phone: phone.to_string(),
                vehicle: "MH01AA0001".to_string(),
            },
            PlanCode::new("INDIVIDUAL"),
            dec!(99),
            Validity::TwelveMonths,
            start() - Duration::days(10),
        );
        let activation = start() - Duration::days(3);
        let expiry = app.expiry_for(activation).unwrap();
        app.activate(card.to_string(), activation, expiry, "ops".to_string());
        app.alert_used = used;
        app.recompute_alerts();
        store.insert(app).await.unwrap()
    }

    fn ledger(store: &Arc<InMemoryStore>, clock: Arc<ManualClock>) -> AlertQuotaLedger {
        AlertQuotaLedger::new(
            store.clone(),
            clock,
            FixedOffset::east_opt(330 * 60).unwrap(),
            FALLBACK.to_string(),
        )
    }

    #[tokio::test]
    async fn test_consume_decrements_allowance() {
        let store = Arc::new(InMemoryStore::new());
        active_card(&store, "0100", "98765 43210", 0).await;
        let ledger = ledger(&store, Arc::new(ManualClock::new(start())));

        let outcome = ledger.consume_one_alert("0100").await.unwrap();
        assert_eq!(
            outcome,
            AlertOutcome::Dispatched {
                phone: "+919876543210".to_string()
            }
        );

        let app = store.get("APP-0100").await.unwrap().unwrap();
        assert_eq!(app.alert_used, 1);
        assert_eq!(app.alerts_left, 14);
    }

    #[tokio::test]
    async fn test_exhausted_card_returns_fallback() {
        let store = Arc::new(InMemoryStore::new());
        active_card(&store, "0101", "9876543210", 15).await;
        let ledger = ledger(&store, Arc::new(ManualClock::new(start())));

        assert_eq!(ledger.ivr_lookup("\"0101\"").await, FALLBACK);
        assert_eq!(ledger.ivr_lookup("").await, FALLBACK);
        assert_eq!(ledger.ivr_lookup("4242").await, FALLBACK);

        let app = store.get("APP-0101").await.unwrap().unwrap();
        assert_eq!(app.alert_used, 15);
    }

    #[tokio::test]
    async fn test_undialable_phone_keeps_increment() {
        let store = Arc::new(InMemoryStore::new());
        active_card(&store, "0102", "12345", 0).await;
        let ledger = ledger(&store, Arc::new(ManualClock::new(start())));

        assert_eq!(ledger.ivr_lookup("0102").await, FALLBACK);
        let app = store.get("APP-0102").await.unwrap().unwrap();
        assert_eq!(app.alert_used, 1);
    }

    #[tokio::test]
    async fn test_resolve_card_phone() {
        let store = Arc::new(InMemoryStore::new());
        active_card(&store, "0103", "9876543210", 0).await;
        let ledger = ledger(&store, Arc::new(ManualClock::new(start())));

        let found = ledger.resolve_card_phone("0103").await.unwrap();
        assert_eq!(found.mobile, "9876543210");
        assert_eq!(
            ledger.resolve_card_phone("103").await.unwrap_err().status_code(),
            400
        );
        assert_eq!(
            ledger.resolve_card_phone("0999").await.unwrap_err().status_code(),
            404
        );

        let app = store.get("APP-0103").await.unwrap().unwrap();
        assert_eq!(app.alert_used, 0);
    }
}
