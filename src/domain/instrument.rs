use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed enumeration over the two instruments this system tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Instrument {
    Btc,
    Eth,
}

impl Instrument {
    pub const ALL: [Instrument; 2] = [Instrument::Btc, Instrument::Eth];

    pub fn code(self) -> &'static str {
        match self {
            Instrument::Btc => "BTC",
            Instrument::Eth => "ETH",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Instrument::Btc => "Bitcoin",
            Instrument::Eth => "Ethereum",
        }
    }

    pub fn base_currency(self) -> &'static str {
        self.code()
    }

    pub fn quote_currency(self) -> &'static str {
        "USD"
    }

    /// Case-insensitive parse from a ticker code, e.g. "btc", "ETH".
    pub fn parse(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "BTC" => Some(Instrument::Btc),
            "ETH" => Some(Instrument::Eth),
            _ => None,
        }
    }

    pub fn code_lower(self) -> String {
        self.code().to_ascii_lowercase()
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Instrument::parse("btc"), Some(Instrument::Btc));
        assert_eq!(Instrument::parse("Eth"), Some(Instrument::Eth));
        assert_eq!(Instrument::parse("doge"), None);
    }

    #[test]
    fn code_lower_round_trips_artifact_filenames() {
        assert_eq!(Instrument::Btc.code_lower(), "btc");
        assert_eq!(Instrument::Eth.code_lower(), "eth");
    }
}
