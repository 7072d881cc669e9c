//! Shared primitives for the escrow settlement workspace.
//!
//! * [`Piconero`] is the integer money type used for every crypto amount in the system.
//! * [`fees`] holds the flat settlement fee arithmetic.
//! * [`Currency`] enumerates the fiat currencies prices can be quoted in.
mod currency;
mod helpers;
mod piconero;

pub mod fees;
pub mod op;

pub use currency::{display_fiat, Currency, CurrencyParseError, DEFAULT_CURRENCY, SUPPORTED_CURRENCIES};
pub use helpers::parse_boolean_flag;
pub use piconero::{Piconero, PiconeroConversionError, PICONERO_PER_XMR, XMR_CURRENCY_CODE};
