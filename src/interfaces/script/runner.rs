use crate::application::engine::CardEngine;
use crate::error::{EngineError, Result};
use crate::infrastructure::clock::ManualClock;
use crate::interfaces::script::command_reader::Command;
use chrono::Duration;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const ALIAS_PREFIX: char = '@';

/// Executes replay commands against an engine and renders each response as
/// one output line.
pub struct ScriptRunner {
    engine: CardEngine,
    clock: Arc<ManualClock>,
    aliases: HashMap<String, String>,
}

impl ScriptRunner {
    pub fn new(engine: CardEngine, clock: Arc<ManualClock>) -> Self {
        Self {
            engine,
            clock,
            aliases: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &CardEngine {
        &self.engine
    }

    /// Resolves `@alias` references to the id generated for that alias.
    fn resolve(&self, application_id: &str) -> Result<String> {
        let trimmed = application_id.trim();
        match trimmed.strip_prefix(ALIAS_PREFIX) {
            Some(alias) => self
                .aliases
                .get(alias)
                .cloned()
                .ok_or_else(|| EngineError::validation(format!("unknown alias {trimmed}"))),
            None => Ok(trimmed.to_string()),
        }
    }

    /// Runs one command. Engine failures are rendered as error lines rather
    /// than aborting the script.
    pub async fn run(&mut self, command: Command) -> String {
        match self.execute(command).await {
            Ok(line) => line,
            Err(err) => render_error(&err),
        }
    }

    async fn execute(&mut self, command: Command) -> Result<String> {
        debug!(?command, "executing script command");
        match command {
            Command::Apply { alias, request } => {
                let response = self.engine.apply(request).await?;
                if let Some(alias) = alias.filter(|a| !a.trim().is_empty()) {
                    self.aliases
                        .insert(alias.trim().to_string(), response.application_id.clone());
                }
                render(&response)
            }
            Command::InitiatePayment { mut request } => {
                request.application_id = self.resolve(&request.application_id)?;
                render(&self.engine.initiate_payment(request).await?)
            }
            Command::RetryPayment { application_id } => {
                let application_id = self.resolve(&application_id)?;
                render(&self.engine.retry_payment(&application_id).await?)
            }
            Command::Webhook { payload } => {
                render(&self.engine.handle_webhook(&self.resolve_payload(payload)?).await?)
            }
            Command::Approve {
                application_id,
                approved_by,
            } => {
                let application_id = self.resolve(&application_id)?;
                render(&self.engine.approve(&application_id, &approved_by).await?)
            }
            Command::EditCard {
                application_id,
                edit,
            } => {
                let application_id = self.resolve(&application_id)?;
                let card = self.engine.edit_card(&application_id, edit).await?;
                render(&json!({ "success": true, "card": card }))
            }
            Command::IvrLookup { digits } => Ok(self.engine.ivr_lookup(&digits).await),
            Command::DigitLookup { digit } => {
                render(&self.engine.resolve_card_phone(&digit).await?)
            }
            Command::Callback {
                application_id,
                code,
            } => {
                let application_id = self.resolve(&application_id)?;
                let location = self.engine.callback_redirect(&application_id, &code);
                render(&json!({ "location": location }))
            }
            Command::AdvanceClock { hours } => {
                let now = Duration::try_hours(hours)
                    .and_then(|by| self.clock.advance(by))
                    .ok_or_else(|| {
                        EngineError::validation(format!("cannot advance the clock by {hours} hours"))
                    })?;
                info!(hours, %now, "replay clock advanced");
                render(&json!({ "success": true }))
            }
        }
    }

    /// Webhook payloads may name the application by alias in `merchantUserId`.
    fn resolve_payload(&self, mut payload: serde_json::Value) -> Result<serde_json::Value> {
        for pointer in ["/merchantUserId", "/data/merchantUserId"] {
            if let Some(slot) = payload.pointer_mut(pointer)
                && let Some(raw) = slot.as_str()
                && raw.starts_with(ALIAS_PREFIX)
            {
                *slot = serde_json::Value::String(self.resolve(raw)?);
            }
        }
        Ok(payload)
    }
}

fn render<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn render_error(err: &EngineError) -> String {
    json!({ "status": err.status_code(), "error": err.to_string() }).to_string()
}
