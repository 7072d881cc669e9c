use std::collections::HashMap;

use esc_common::Currency;
use thiserror::Error;

use crate::db_types::ExchangeRate;

#[derive(Debug, Clone, Error)]
pub enum ExchangeRateError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The requested exchange rate does not exist: {0}")]
    RateDoesNotExist(String),
    #[error("No exchange rates have been stored yet")]
    NoRates,
}

impl From<sqlx::Error> for ExchangeRateError {
    fn from(e: sqlx::Error) -> Self {
        ExchangeRateError::DatabaseError(e.to_string())
    }
}

#[allow(async_fn_in_trait)]
pub trait ExchangeRates {
    /// Fetch the last stored price for every currency that has one.
    async fn fetch_latest_rates(&self) -> Result<Vec<ExchangeRate>, ExchangeRateError>;

    /// Fetch the last price for the given currency. If the rate does not exist, the error
    /// [`ExchangeRateError::RateDoesNotExist`] is returned.
    async fn fetch_last_rate(&self, currency: Currency) -> Result<ExchangeRate, ExchangeRateError>;

    /// Save a new set of prices (price of one XMR per currency) to the backend storage, in one transaction
    async fn set_prices(&self, prices: &HashMap<Currency, f64>) -> Result<(), ExchangeRateError>;
}
