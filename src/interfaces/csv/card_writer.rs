use crate::domain::application::{Application, ApplicationStatus};
use crate::error::Result;
use chrono::SecondsFormat;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CardRow<'a> {
    application_id: &'a str,
    card_number: &'a str,
    status: ApplicationStatus,
    plan: &'a str,
    alert_limit: u32,
    alert_used: u32,
    alerts_left: u32,
    expiry_at: String,
}

impl<'a> From<&'a Application> for CardRow<'a> {
    fn from(app: &'a Application) -> Self {
        Self {
            application_id: &app.application_id,
            card_number: app.card_number.as_deref().unwrap_or_default(),
            status: app.status,
            plan: app.plan.as_str(),
            alert_limit: app.alert_limit,
            alert_used: app.alert_used,
            alerts_left: app.alerts_left,
            expiry_at: app
                .expiry_at
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
        }
    }
}

/// Writes the card roster as CSV.
pub struct CardWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CardWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes one row per card and flushes. The header is written even when
    /// there are no cards.
    pub fn write_cards<'a, I>(&mut self, cards: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Application>,
    {
        let mut wrote_any = false;
        for card in cards {
            self.writer.serialize(CardRow::from(card))?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record([
                "applicationId",
                "cardNumber",
                "status",
                "plan",
                "alertLimit",
                "alertUsed",
                "alertsLeft",
                "expiryAt",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
