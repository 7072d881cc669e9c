use std::{fmt::Display, str::FromStr};

use log::error;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fiat currencies that prices can be quoted in. Fiat amounts are always carried as integer minor units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    EUR,
    GBP,
    CHF,
    SEK,
    NOK,
    DKK,
    PLN,
    CZK,
    HUF,
    USD,
    CAD,
    AUD,
    NZD,
    JPY,
    CNY,
    HKD,
    SGD,
    KRW,
    INR,
    BRL,
    MXN,
    ZAR,
}

pub const DEFAULT_CURRENCY: Currency = Currency::USD;

pub const SUPPORTED_CURRENCIES: [Currency; 22] = [
    Currency::EUR,
    Currency::GBP,
    Currency::CHF,
    Currency::SEK,
    Currency::NOK,
    Currency::DKK,
    Currency::PLN,
    Currency::CZK,
    Currency::HUF,
    Currency::USD,
    Currency::CAD,
    Currency::AUD,
    Currency::NZD,
    Currency::JPY,
    Currency::CNY,
    Currency::HKD,
    Currency::SGD,
    Currency::KRW,
    Currency::INR,
    Currency::BRL,
    Currency::MXN,
    Currency::ZAR,
];

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::CHF => "CHF",
            Currency::SEK => "SEK",
            Currency::NOK => "NOK",
            Currency::DKK => "DKK",
            Currency::PLN => "PLN",
            Currency::CZK => "CZK",
            Currency::HUF => "HUF",
            Currency::USD => "USD",
            Currency::CAD => "CAD",
            Currency::AUD => "AUD",
            Currency::NZD => "NZD",
            Currency::JPY => "JPY",
            Currency::CNY => "CNY",
            Currency::HKD => "HKD",
            Currency::SGD => "SGD",
            Currency::KRW => "KRW",
            Currency::INR => "INR",
            Currency::BRL => "BRL",
            Currency::MXN => "MXN",
            Currency::ZAR => "ZAR",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::CHF => "Fr",
            Currency::SEK | Currency::NOK | Currency::DKK => "kr",
            Currency::PLN => "zł",
            Currency::CZK => "Kč",
            Currency::HUF => "Ft",
            Currency::USD | Currency::MXN => "$",
            Currency::CAD => "C$",
            Currency::AUD => "A$",
            Currency::NZD => "NZ$",
            Currency::JPY | Currency::CNY => "¥",
            Currency::HKD => "HK$",
            Currency::SGD => "S$",
            Currency::KRW => "₩",
            Currency::INR => "₹",
            Currency::BRL => "R$",
            Currency::ZAR => "R",
        }
    }

    /// Parses a currency code, falling back to [`DEFAULT_CURRENCY`] if the code is not supported.
    pub fn from_code_or_default(code: &str) -> Self {
        code.parse().unwrap_or_else(|e| {
            error!("💱️ {e}. Falling back to {DEFAULT_CURRENCY}");
            DEFAULT_CURRENCY
        })
    }
}

impl Default for Currency {
    fn default() -> Self {
        DEFAULT_CURRENCY
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unsupported currency: {0}")]
pub struct CurrencyParseError(String);

impl FromStr for Currency {
    type Err = CurrencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        SUPPORTED_CURRENCIES
            .iter()
            .find(|c| c.code() == code)
            .copied()
            .ok_or_else(|| CurrencyParseError(s.to_string()))
    }
}

/// Formats an amount of fiat minor units with two decimal places, e.g. `1513` => `"15.13"`.
pub fn display_fiat(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_codes() {
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::USD);
        assert_eq!(" EUR ".parse::<Currency>().unwrap(), Currency::EUR);
        assert!("XYZ".parse::<Currency>().is_err());
        assert_eq!(Currency::from_code_or_default("XYZ"), Currency::USD);
        for c in SUPPORTED_CURRENCIES {
            assert_eq!(c.code().parse::<Currency>().unwrap(), c);
        }
    }

    #[test]
    fn symbols() {
        assert_eq!(Currency::USD.symbol(), "$");
        assert_eq!(Currency::NZD.symbol(), "NZ$");
        assert_eq!(Currency::DKK.symbol(), "kr");
    }

    #[test]
    fn fiat_display() {
        assert_eq!(display_fiat(1513), "15.13");
        assert_eq!(display_fiat(5), "0.05");
        assert_eq!(display_fiat(100_000), "1000.00");
        assert_eq!(display_fiat(-250), "-2.50");
    }
}
