use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable record of one staff change to a card's extra-alert grant.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QuotaAdjustmentEntry {
    pub entry_id: Uuid,
    pub application_id: String,
    pub card_number: String,
    pub delta: i64,
    pub previous_extra_alerts: u32,
    pub new_extra_alerts: u32,
    pub reason: String,
    pub adjusted_by: String,
    pub recorded_at: DateTime<Utc>,
}

impl QuotaAdjustmentEntry {
    /// Builds an entry for a change from `previous` to `new`, or `None` when
    /// nothing changed.
    pub fn for_change(
        application_id: &str,
        card_number: &str,
        previous: u32,
        new: u32,
        reason: &str,
        adjusted_by: &str,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let delta = i64::from(new) - i64::from(previous);
        (delta != 0).then(|| Self {
            entry_id: Uuid::new_v4(),
            application_id: application_id.to_string(),
            card_number: card_number.to_string(),
            delta,
            previous_extra_alerts: previous,
            new_extra_alerts: new,
            reason: reason.to_string(),
            adjusted_by: adjusted_by.to_string(),
            recorded_at: now,
        })
    }
}
