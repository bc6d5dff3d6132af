/// Shape of a named, zero-padded counter sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceSpec {
    /// Counter row name.
    pub name: &'static str,
    /// Counter row written by a previous numbering scheme, used once as a seed.
    pub legacy_name: Option<&'static str>,
    /// Smallest token that may be issued.
    pub floor: u64,
    /// Largest token that may be issued.
    pub ceiling: u64,
    /// Zero-padding width of the formatted token.
    pub width: usize,
}

/// Card numbers printed on physical cards: `0100` through `9999`.
pub const CARD_NUMBER_SEQUENCE: SequenceSpec = SequenceSpec {
    name: "cardNumber",
    legacy_name: Some("cardId"),
    floor: 100,
    ceiling: 9999,
    width: 4,
};

impl SequenceSpec {
    /// Counter value a fresh sequence starts from, so the first token is `floor`.
    pub fn initial_seq(&self, legacy_seq: Option<u64>) -> u64 {
        let start = self.floor - 1;
        legacy_seq.map_or(start, |seq| seq.max(start))
    }

    pub fn contains(&self, value: u64) -> bool {
        (self.floor..=self.ceiling).contains(&value)
    }

    pub fn format(&self, value: u64) -> String {
        format!("{value:0width$}", width = self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_number_format() {
        assert_eq!(CARD_NUMBER_SEQUENCE.format(100), "0100");
        assert_eq!(CARD_NUMBER_SEQUENCE.format(9999), "9999");
    }

    #[test]
    fn test_initial_seq() {
        assert_eq!(CARD_NUMBER_SEQUENCE.initial_seq(None), 99);
        assert_eq!(CARD_NUMBER_SEQUENCE.initial_seq(Some(4321)), 4321);
        assert_eq!(CARD_NUMBER_SEQUENCE.initial_seq(Some(5)), 99);
    }

    #[test]
    fn test_range() {
        assert!(!CARD_NUMBER_SEQUENCE.contains(99));
        assert!(CARD_NUMBER_SEQUENCE.contains(100));
        assert!(CARD_NUMBER_SEQUENCE.contains(9999));
        assert!(!CARD_NUMBER_SEQUENCE.contains(10000));
    }
}
