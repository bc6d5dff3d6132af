use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base alert allowance granted per subscription period for known plans.
const STANDARD_ALERT_ALLOWANCE: u32 = 15;

/// A subscription plan code, always stored trimmed and uppercased.
///
/// Unknown codes are accepted (staff may type anything into the card editor)
/// but carry no alert allowance and no list price.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PlanCode(String);

impl PlanCode {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Base alert allowance for the plan, before any staff-granted extras.
    pub fn base_alert_limit(&self) -> u32 {
        match self.0.as_str() {
            "INDIVIDUAL" | "FAMILY" | "PREMIUM" | "PLUS" | "PRIME" | "PRO" => {
                STANDARD_ALERT_ALLOWANCE
            }
            _ => 0,
        }
    }

    /// Customer-facing label printed on cards and receipts.
    pub fn display(&self) -> String {
        match self.0.as_str() {
            "INDIVIDUAL" => "PLUS".to_string(),
            "FAMILY" => "PRIME".to_string(),
            "PREMIUM" => "PRO".to_string(),
            "" => "UNKNOWN".to_string(),
            other => other.to_string(),
        }
    }

    /// Price charged when the applicant does not quote an amount.
    pub fn list_price(&self) -> Option<Decimal> {
        match self.0.as_str() {
            "INDIVIDUAL" => Some(dec!(99)),
            "FAMILY" => Some(dec!(199)),
            "PREMIUM" => Some(dec!(499)),
            _ => None,
        }
    }
}

impl From<String> for PlanCode {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<PlanCode> for String {
    fn from(plan: PlanCode) -> Self {
        plan.0
    }
}

impl fmt::Display for PlanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_normalization() {
        assert_eq!(PlanCode::new("  individual ").as_str(), "INDIVIDUAL");
        assert!(PlanCode::new("   ").is_empty());
    }

    #[test]
    fn test_alert_allowance() {
        assert_eq!(PlanCode::new("INDIVIDUAL").base_alert_limit(), 15);
        assert_eq!(PlanCode::new("pro").base_alert_limit(), 15);
        assert_eq!(PlanCode::new("GOLD").base_alert_limit(), 0);
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(PlanCode::new("INDIVIDUAL").display(), "PLUS");
        assert_eq!(PlanCode::new("family").display(), "PRIME");
        assert_eq!(PlanCode::new("PREMIUM").display(), "PRO");
        assert_eq!(PlanCode::new("GOLD").display(), "GOLD");
        assert_eq!(PlanCode::new("").display(), "UNKNOWN");
    }

    #[test]
    fn test_list_prices() {
        assert_eq!(PlanCode::new("FAMILY").list_price(), Some(dec!(199)));
        assert_eq!(PlanCode::new("PLUS").list_price(), None);
    }

    #[test]
    fn test_serde_normalizes() {
        let plan: PlanCode = serde_json::from_str("\" premium\"").unwrap();
        assert_eq!(plan.as_str(), "PREMIUM");
        assert_eq!(serde_json::to_string(&plan).unwrap(), "\"PREMIUM\"");
    }
}
