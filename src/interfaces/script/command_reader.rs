use crate::application::engine::PaymentInitRequest;
use crate::application::lifecycle::{ApplicationRequest, CardEdit};
use crate::error::{EngineError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::io::BufRead;

/// One line of a replay script.
///
/// The `command` field picks the variant; every other field is camelCase, as
/// on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    Apply {
        /// Name later commands can use as `@alias` in place of the generated id.
        #[serde(default)]
        alias: Option<String>,
        #[serde(flatten)]
        request: ApplicationRequest,
    },
    InitiatePayment {
        #[serde(flatten)]
        request: PaymentInitRequest,
    },
    RetryPayment {
        application_id: String,
    },
    Webhook {
        payload: Value,
    },
    Approve {
        application_id: String,
        #[serde(default)]
        approved_by: String,
    },
    EditCard {
        application_id: String,
        #[serde(flatten)]
        edit: CardEdit,
    },
    IvrLookup {
        #[serde(default)]
        digits: String,
    },
    DigitLookup {
        digit: String,
    },
    Callback {
        #[serde(default)]
        application_id: String,
        #[serde(default)]
        code: String,
    },
    /// Moves the replay clock forward.
    AdvanceClock {
        hours: i64,
    },
}

/// Reads commands from a JSON-lines source.
///
/// Blank lines and lines starting with `#` are skipped. Each item carries the
/// 1-based line number it came from.
pub struct CommandReader<R: BufRead> {
    source: R,
}

impl<R: BufRead> CommandReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    /// Lazily parses one command per line.
    pub fn commands(self) -> impl Iterator<Item = (usize, Result<Command>)> {
        self.source
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let line_no = index + 1;
                match line {
                    Ok(line) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() || trimmed.starts_with('#') {
                            None
                        } else {
                            Some((line_no, serde_json::from_str(trimmed).map_err(EngineError::from)))
                        }
                    }
                    Err(err) => Some((line_no, Err(EngineError::from(err)))),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_parses_commands() {
        let script = r#"
# submit then approve
{"command":"apply","alias":"asha","name":"Asha","email":"a@example.com","phone":"9876543210","vehicle":"DL01AB1234","plan":"INDIVIDUAL","amount":99.5}
{"command":"approve","applicationId":"@asha","approvedBy":"ops"}
{"command":"editCard","applicationId":"@asha","extraAlertsGranted":5,"extraAlertsReason":"VIP request"}
{"command":"ivrLookup","digits":"\"0100\""}
"#;
        let commands: Vec<_> = CommandReader::new(script.as_bytes()).commands().collect();
        assert_eq!(commands.len(), 4);

        let (line, apply) = &commands[0];
        assert_eq!(*line, 3);
        match apply.as_ref().unwrap() {
            Command::Apply { alias, request } => {
                assert_eq!(alias.as_deref(), Some("asha"));
                assert_eq!(request.plan, "INDIVIDUAL");
                assert_eq!(request.amount, Some(dec!(99.5)));
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert_eq!(
            commands[1].1.as_ref().unwrap(),
            &Command::Approve {
                application_id: "@asha".to_string(),
                approved_by: "ops".to_string(),
            }
        );
        match commands[2].1.as_ref().unwrap() {
            Command::EditCard { edit, .. } => {
                assert_eq!(edit.extra_alerts_granted, Some(5));
                assert_eq!(edit.extra_alerts_reason.as_deref(), Some("VIP request"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_reader_reports_bad_lines() {
        let script = "{\"command\":\"teleport\"}\nnot json\n";
        let commands: Vec<_> = CommandReader::new(script.as_bytes()).commands().collect();
        assert_eq!(commands.len(), 2);
        assert!(commands.iter().all(|(_, result)| result.is_err()));
    }
}
