//! Runtime configuration.
//!
//! Every setting can come from a command-line flag or its environment variable,
//! so the same binary runs unchanged under a process manager that only injects
//! environment.

use crate::error::{EngineError, Result};
use chrono::{Duration, FixedOffset, Offset, Utc};
use clap::Args;

pub const PHONEPE_SANDBOX_PAY_URL: &str =
    "https://api-preprod.phonepe.com/apis/pg-sandbox/pg/v1/pay";
pub const DEFAULT_IVR_FALLBACK_NUMBER: &str = "+918750920902";
/// India Standard Time, the calendar used for activation-day comparisons.
pub const DEFAULT_LOCAL_UTC_OFFSET_MINUTES: i32 = 330;
pub const DEFAULT_ACTIVATION_DELAY_HOURS: i64 = 48;

fn parse_switch(raw: &str) -> std::result::Result<bool, String> {
    Ok(matches!(
        raw.trim().to_lowercase().as_str(),
        "true" | "1" | "yes"
    ))
}

fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_suffix('/').unwrap_or(trimmed).to_string()
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Args)]
pub struct EngineArgs {
    /// Record payments as successful without contacting the gateway.
    #[arg(long, env = "PHONEPE_BYPASS", default_value = "false", value_parser = parse_switch)]
    pub bypass_payments: bool,

    #[arg(long, env = "PHONEPE_MERCHANT_ID")]
    pub merchant_id: Option<String>,

    /// Gateway salt key (`PHONEPE_CLIENT_SECRET` takes precedence).
    #[arg(long, env = "PHONEPE_SALT_KEY", hide_env_values = true)]
    pub salt_key: Option<String>,

    #[arg(long, env = "PHONEPE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Gateway salt index (`PHONEPE_CLIENT_VERSION` takes precedence).
    #[arg(long, env = "PHONEPE_SALT_INDEX")]
    pub salt_index: Option<String>,

    #[arg(long, env = "PHONEPE_CLIENT_VERSION")]
    pub client_version: Option<String>,

    /// Public base URL the gateway calls back into.
    #[arg(long, env = "BACKEND_PUBLIC_URL")]
    pub backend_public_url: Option<String>,

    #[arg(long, env = "BASE_URL", hide = true)]
    pub base_url: Option<String>,

    #[arg(long, env = "PHONEPE_PAY_API_URL", default_value = PHONEPE_SANDBOX_PAY_URL)]
    pub pay_api_url: String,

    #[arg(long, env = "PHONEPE_REDIRECT_MODE", default_value = "REDIRECT")]
    pub redirect_mode: String,

    /// Upper bound on one pay-initiation call, in seconds.
    #[arg(long, env = "PHONEPE_TIMEOUT_SECS", default_value_t = 15)]
    pub gateway_timeout_secs: u64,

    /// Frontend base URL for payer redirects.
    #[arg(long, env = "USER_FRONTEND_URL", default_value = "")]
    pub user_frontend_url: String,

    /// Number handed to the telephony caller whenever no card number can be dialled.
    #[arg(long, env = "IVR_FALLBACK_NUMBER", default_value = DEFAULT_IVR_FALLBACK_NUMBER)]
    pub ivr_fallback_number: String,

    #[arg(long, env = "LOCAL_UTC_OFFSET_MINUTES", default_value_t = DEFAULT_LOCAL_UTC_OFFSET_MINUTES, allow_hyphen_values = true)]
    pub local_utc_offset_minutes: i32,

    #[arg(long, env = "ACTIVATION_DELAY_HOURS", default_value_t = DEFAULT_ACTIVATION_DELAY_HOURS)]
    pub activation_delay_hours: i64,
}

/// Everything the pay-page adapter needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub merchant_id: String,
    pub salt_key: String,
    pub salt_index: String,
    pub backend_public_url: String,
    pub pay_api_url: String,
    pub redirect_mode: String,
    pub timeout: std::time::Duration,
}

/// Settings the engine itself consults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub bypass_payments: bool,
    pub user_frontend_url: String,
    pub ivr_fallback_number: String,
    pub local_offset: FixedOffset,
    pub activation_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bypass_payments: false,
            user_frontend_url: String::new(),
            ivr_fallback_number: DEFAULT_IVR_FALLBACK_NUMBER.to_string(),
            local_offset: FixedOffset::east_opt(DEFAULT_LOCAL_UTC_OFFSET_MINUTES * 60)
                .unwrap_or_else(|| Utc.fix()),
            activation_delay: Duration::hours(DEFAULT_ACTIVATION_DELAY_HOURS),
        }
    }
}

impl EngineArgs {
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let local_offset = FixedOffset::east_opt(self.local_utc_offset_minutes * 60)
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "LOCAL_UTC_OFFSET_MINUTES out of range: {}",
                    self.local_utc_offset_minutes
                ))
            })?;
        if self.activation_delay_hours < 0 {
            return Err(EngineError::validation(
                "ACTIVATION_DELAY_HOURS must not be negative",
            ));
        }
        let activation_delay = Duration::try_hours(self.activation_delay_hours).ok_or_else(|| {
            EngineError::validation(format!(
                "ACTIVATION_DELAY_HOURS out of range: {}",
                self.activation_delay_hours
            ))
        })?;

        Ok(EngineConfig {
            bypass_payments: self.bypass_payments,
            user_frontend_url: normalize_url(&self.user_frontend_url),
            ivr_fallback_number: self.ivr_fallback_number.trim().to_string(),
            local_offset,
            activation_delay,
        })
    }

    /// Gateway settings, or the name of the first missing variable.
    pub fn gateway_settings(&self) -> Result<GatewaySettings> {
        let merchant_id = non_blank(&self.merchant_id)
            .ok_or_else(|| EngineError::validation("Missing PHONEPE_MERCHANT_ID"))?;
        let salt_key = non_blank(&self.client_secret)
            .or_else(|| non_blank(&self.salt_key))
            .ok_or_else(|| {
                EngineError::validation("Missing PHONEPE_CLIENT_SECRET or PHONEPE_SALT_KEY")
            })?;
        let salt_index = non_blank(&self.client_version)
            .or_else(|| non_blank(&self.salt_index))
            .ok_or_else(|| {
                EngineError::validation("Missing PHONEPE_CLIENT_VERSION or PHONEPE_SALT_INDEX")
            })?;
        let backend_public_url = non_blank(&self.backend_public_url)
            .or_else(|| non_blank(&self.base_url))
            .map(|url| normalize_url(&url))
            .ok_or_else(|| EngineError::validation("Missing BACKEND_PUBLIC_URL or BASE_URL"))?;

        let pay_api_url = match self.pay_api_url.trim() {
            "" => PHONEPE_SANDBOX_PAY_URL.to_string(),
            url => url.to_string(),
        };
        let redirect_mode = match self.redirect_mode.trim() {
            "" => "REDIRECT".to_string(),
            mode => mode.to_string(),
        };

        Ok(GatewaySettings {
            merchant_id,
            salt_key,
            salt_index,
            backend_public_url,
            pay_api_url,
            redirect_mode,
            timeout: std::time::Duration::from_secs(self.gateway_timeout_secs.max(1)),
        })
    }
}
