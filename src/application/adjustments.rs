use crate::domain::adjustment::QuotaAdjustmentEntry;
use crate::domain::application::Application;
use crate::domain::ports::AdjustmentStoreRef;
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use tracing::info;

pub const DEFAULT_ADJUSTED_BY: &str = "support";

/// Append-only trail of staff changes to extra-alert grants.
#[derive(Clone)]
pub struct QuotaAdjustmentLedger {
    adjustments: AdjustmentStoreRef,
}

impl QuotaAdjustmentLedger {
    pub fn new(adjustments: AdjustmentStoreRef) -> Self {
        Self { adjustments }
    }

    /// Applies a new extra-alert grant to `application` and returns the entry
    /// describing the change, or `None` when the grant did not move.
    ///
    /// A reason is required whenever the grant changes. Nothing is persisted
    /// here; the caller writes the application first and then hands the entry
    /// to [`Self::record`].
    pub fn adjust_extra_alerts(
        &self,
        application: &mut Application,
        new_extra: u32,
        reason: &str,
        adjusted_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<QuotaAdjustmentEntry>> {
        let previous = application.extra_alerts_granted;
        let reason = reason.trim();
        if new_extra != previous && reason.is_empty() {
            return Err(EngineError::validation(
                "extraAlertsReason is required when adjusting extra alerts",
            ));
        }
        let adjusted_by = match adjusted_by.trim() {
            "" => DEFAULT_ADJUSTED_BY,
            by => by,
        };

        application.grant_extra_alerts(
            new_extra,
            reason.to_string(),
            adjusted_by.to_string(),
            now,
        );

        Ok(QuotaAdjustmentEntry::for_change(
            &application.application_id,
            application.card_number.as_deref().unwrap_or_default(),
            previous,
            new_extra,
            reason,
            adjusted_by,
            now,
        ))
    }

    pub async fn record(&self, entry: QuotaAdjustmentEntry) -> Result<()> {
        info!(
            target: "parkcard::audit",
            application_id = %entry.application_id,
            card_number = %entry.card_number,
            delta = entry.delta,
            adjusted_by = %entry.adjusted_by,
            "extra alerts adjusted"
        );
        self.adjustments.append(entry).await
    }

    /// Adjustment trail of one application, oldest first.
    pub async fn entries_for(&self, application_id: &str) -> Result<Vec<QuotaAdjustmentEntry>> {
        self.adjustments.list_for(application_id.trim()).await
    }
}
