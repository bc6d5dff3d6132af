//! Phone and vehicle registration canonicalization.

/// Country prefix used when handing numbers to the telephony provider.
pub const DIAL_PREFIX: &str = "+91";

fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Canonical 10-digit subscriber number.
///
/// Non-digits are dropped and, when more than ten digits remain, only the last
/// ten are kept (so `+91 98765 43210` becomes `9876543210`). Returns `None`
/// unless exactly ten digits are left.
pub fn canonical_phone(raw: &str) -> Option<String> {
    let digits = digits_only(raw);
    let local = if digits.len() > 10 {
        &digits[digits.len() - 10..]
    } else {
        digits.as_str()
    };
    (local.len() == 10).then(|| local.to_string())
}

/// `+91XXXXXXXXXX` form of a stored phone number.
pub fn dialable_phone(raw: &str) -> Option<String> {
    canonical_phone(raw).map(|local| format!("{DIAL_PREFIX}{local}"))
}

/// Uppercased registration, accepted when it is 6 to 15 of `A-Z`, `0-9`, `-`.
pub fn canonical_vehicle(raw: &str) -> Option<String> {
    let vehicle = raw.trim().to_uppercase();
    let valid = (6..=15).contains(&vehicle.len())
        && vehicle
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-');
    valid.then_some(vehicle)
}
