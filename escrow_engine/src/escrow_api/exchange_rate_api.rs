//! Persisted XMR prices. The live conversions use the in-memory [`super::price_table::PriceTable`], which loads from
//! here.
use std::{collections::HashMap, fmt::Debug};

use esc_common::Currency;
use log::*;

use crate::{
    db_types::ExchangeRate,
    traits::{ExchangeRateError, ExchangeRates},
};

pub struct ExchangeRateApi<B> {
    db: B,
}

impl<B> Debug for ExchangeRateApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExchangeRateApi")
    }
}

impl<B> ExchangeRateApi<B>
where B: ExchangeRates
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn fetch_last_rate(&self, currency: Currency) -> Result<ExchangeRate, ExchangeRateError> {
        self.db.fetch_last_rate(currency).await
    }

    pub async fn fetch_latest_rates(&self) -> Result<Vec<ExchangeRate>, ExchangeRateError> {
        self.db.fetch_latest_rates().await
    }

    /// Stores a new set of prices. Prices that are not finite and positive are dropped with a warning.
    pub async fn set_prices(&self, prices: HashMap<Currency, f64>) -> Result<usize, ExchangeRateError> {
        let valid = prices
            .into_iter()
            .filter(|(c, p)| {
                let ok = p.is_finite() && *p > 0.0;
                if !ok {
                    warn!("💱️ Ignoring invalid {c} price {p}");
                }
                ok
            })
            .collect::<HashMap<Currency, f64>>();
        if valid.is_empty() {
            return Err(ExchangeRateError::NoRates);
        }
        self.db.set_prices(&valid).await?;
        Ok(valid.len())
    }
}
