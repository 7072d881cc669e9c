//! In-memory crypto price table.
//!
//! Prices are loaded from the [`ExchangeRates`] backend and held behind a lock so that conversions never touch the
//! database. The table is owned by the application and handed to the APIs that need it; it is refreshed on an interval
//! by [`PriceTable::run_refresh`] until the shutdown signal fires.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use esc_common::{Currency, Piconero, PICONERO_PER_XMR};
use log::*;
use parking_lot::RwLock;
use tokio::{
    sync::watch,
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::traits::{ExchangeRateError, ExchangeRates};

#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    /// Price of one whole XMR, per fiat currency
    prices: Arc<RwLock<HashMap<Currency, f64>>>,
    loaded: Arc<AtomicBool>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table pre-filled with the given prices
    pub fn with_prices(prices: HashMap<Currency, f64>) -> Self {
        let table = Self::new();
        table.replace(prices);
        table
    }

    /// True once prices have been loaded at least once
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn replace(&self, prices: HashMap<Currency, f64>) {
        *self.prices.write() = prices;
        self.loaded.store(true, Ordering::Release);
    }

    pub fn price(&self, currency: Currency) -> Option<f64> {
        self.prices.read().get(&currency).copied()
    }

    /// The price of one XMR in minor units of `currency`
    fn price_cents(&self, currency: Currency) -> Result<i64, ExchangeRateError> {
        let price = self.price(currency).ok_or_else(|| ExchangeRateError::RateDoesNotExist(currency.to_string()))?;
        let cents = (price * 100.0).round() as i64;
        if cents <= 0 {
            return Err(ExchangeRateError::RateDoesNotExist(currency.to_string()));
        }
        Ok(cents)
    }

    /// Converts fiat minor units to piconero, truncating any fraction of a piconero
    pub fn fiat_to_crypto(&self, currency: Currency, cents: i64) -> Result<Piconero, ExchangeRateError> {
        let price = self.price_cents(currency)?;
        let pico = i128::from(PICONERO_PER_XMR) * i128::from(cents) / i128::from(price);
        i64::try_from(pico)
            .map(Piconero::from)
            .map_err(|_| ExchangeRateError::RateDoesNotExist(format!("{cents} {currency} is out of range")))
    }

    /// Converts piconero to fiat minor units, truncating any fraction of a cent
    pub fn crypto_to_fiat(&self, currency: Currency, amount: Piconero) -> Result<i64, ExchangeRateError> {
        let price = self.price_cents(currency)?;
        let cents = i128::from(price) * i128::from(amount.value()) / i128::from(PICONERO_PER_XMR);
        i64::try_from(cents)
            .map_err(|_| ExchangeRateError::RateDoesNotExist(format!("{amount} in {currency} is out of range")))
    }

    /// Converts between two fiat currencies through their XMR prices, rounding to the nearest minor unit.
    ///
    /// If either price is unknown, the error is logged and zero is returned.
    pub fn fiat_to_fiat(&self, from: Currency, to: Currency, cents: i64) -> i64 {
        if from == to {
            return cents;
        }
        let prices = self.prices.read();
        match (prices.get(&from), prices.get(&to)) {
            (Some(&pf), Some(&pt)) if pf > 0.0 => (cents as f64 * pt / pf).round() as i64,
            _ => {
                error!("💱️ Cannot convert {from} to {to}. One of the prices is missing");
                0
            },
        }
    }

    /// Replaces the table contents with the latest stored rates. Returns the number of prices loaded.
    pub async fn load<B: ExchangeRates>(&self, db: &B) -> Result<usize, ExchangeRateError> {
        let rates = db.fetch_latest_rates().await?;
        if rates.is_empty() {
            return Err(ExchangeRateError::NoRates);
        }
        let mut prices = HashMap::with_capacity(rates.len());
        for rate in rates {
            match rate.currency.parse::<Currency>() {
                Ok(c) => {
                    prices.insert(c, rate.price);
                },
                Err(e) => warn!("💱️ Ignoring stored rate. {e}"),
            }
        }
        let n = prices.len();
        self.replace(prices);
        trace!("💱️ Price table refreshed with {n} prices");
        Ok(n)
    }

    /// Loads the table immediately. Call this once at start-up, before handing the table out.
    pub async fn start<B: ExchangeRates>(&self, db: &B) -> Result<usize, ExchangeRateError> {
        let n = self.load(db).await?;
        info!("💱️ Price table loaded with {n} prices");
        Ok(n)
    }

    /// Reloads the table every `period` until `shutdown` becomes true or its sender is dropped.
    ///
    /// A failed reload keeps the previous prices and is retried on the next tick.
    pub async fn run_refresh<B: ExchangeRates>(&self, db: B, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.load(&db).await {
                        warn!("💱️ Could not refresh the price table. Keeping the old prices. {e}");
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                },
            }
        }
        info!("💱️ Price table refresh stopped");
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn table() -> PriceTable {
        let prices = [(Currency::USD, 100.0), (Currency::EUR, 92.5), (Currency::JPY, 15_000.0)];
        PriceTable::with_prices(HashMap::from(prices))
    }

    #[test]
    fn fiat_to_crypto() {
        let prices = table();
        // $1000 at $100 per XMR
        assert_eq!(prices.fiat_to_crypto(Currency::USD, 100_000).unwrap(), Piconero::from_xmr(10));
        // 1 cent
        assert_eq!(prices.fiat_to_crypto(Currency::USD, 1).unwrap(), Piconero::from(100_000_000));
        assert!(matches!(
            prices.fiat_to_crypto(Currency::GBP, 100),
            Err(ExchangeRateError::RateDoesNotExist(_))
        ));
    }

    #[test]
    fn crypto_to_fiat() {
        let prices = table();
        assert_eq!(prices.crypto_to_fiat(Currency::USD, Piconero::from_xmr(10)).unwrap(), 100_000);
        assert_eq!(prices.crypto_to_fiat(Currency::EUR, Piconero::from_xmr(2)).unwrap(), 18_500);
        // less than a cent
        assert_eq!(prices.crypto_to_fiat(Currency::USD, Piconero::from(99_999_999)).unwrap(), 0);
    }

    #[test]
    fn fiat_to_fiat() {
        let prices = table();
        assert_eq!(prices.fiat_to_fiat(Currency::USD, Currency::USD, 1234), 1234);
        assert_eq!(prices.fiat_to_fiat(Currency::USD, Currency::JPY, 100), 15_000);
        assert_eq!(prices.fiat_to_fiat(Currency::USD, Currency::EUR, 1000), 925);
        assert_eq!(prices.fiat_to_fiat(Currency::USD, Currency::GBP, 1000), 0);
    }

    #[test]
    fn not_loaded_until_filled() {
        let prices = PriceTable::new();
        assert!(!prices.is_loaded());
        assert!(prices.fiat_to_crypto(Currency::USD, 100).is_err());
        prices.replace(HashMap::from([(Currency::USD, 150.0)]));
        assert!(prices.is_loaded());
        assert_eq!(prices.price(Currency::USD), Some(150.0));
    }

    proptest! {
        // Converting into a currency with smaller units and back is accurate to one minor unit
        #[test]
        fn fiat_round_trip(cents in 0i64..1_000_000_000, from_price in 1.0f64..1_000.0, factor in 1.0f64..500.0) {
            let to_price = from_price * factor;
            let prices =
                PriceTable::with_prices(HashMap::from([(Currency::USD, from_price), (Currency::JPY, to_price)]));
            let there = prices.fiat_to_fiat(Currency::USD, Currency::JPY, cents);
            let back = prices.fiat_to_fiat(Currency::JPY, Currency::USD, there);
            prop_assert!((back - cents).abs() <= 1, "{cents} -> {there} -> {back}");
        }
    }
}
