//! Fetches XMR prices from a public price API and stores them as exchange rates.
//!
//! The feed expects a flat JSON object of currency codes to prices, e.g. `{"USD": 151.2, "EUR": 139.9}`, which is
//! what cryptocompare's `/data/price` endpoint returns.
use std::{collections::HashMap, sync::Arc};

use esc_common::{Currency, SUPPORTED_CURRENCIES, XMR_CURRENCY_CODE};
use escrow_engine::{traits::ExchangeRates, ExchangeRateApi};
use log::*;
use reqwest::{Client, Proxy};
use serde_json::Value;

use crate::errors::{PriceFeedError, WorkerError};

#[derive(Clone)]
pub struct PriceFeed {
    url: String,
    client: Arc<Client>,
}

impl std::fmt::Debug for PriceFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PriceFeed ({})", self.url)
    }
}

impl PriceFeed {
    /// Builds the feed's HTTP client. When `proxy` is given (`http://`, `socks5://` or `socks5h://`), every price
    /// request is routed through it.
    pub fn new(url: &str, timeout: std::time::Duration, proxy: Option<&str>) -> Result<Self, PriceFeedError> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(proxy) = proxy {
            let proxy = Proxy::all(proxy).map_err(|e| PriceFeedError::InvalidProxy(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|e| PriceFeedError::RequestFailed(e.to_string()))?;
        Ok(Self { url: url.to_string(), client: Arc::new(client) })
    }

    /// Fetches the current XMR price in every supported currency
    pub async fn fetch_prices(&self) -> Result<HashMap<Currency, f64>, PriceFeedError> {
        let tsyms = SUPPORTED_CURRENCIES.iter().map(|c| c.code()).collect::<Vec<&str>>().join(",");
        let response = self
            .client
            .get(&self.url)
            .query(&[("fsym", XMR_CURRENCY_CODE), ("tsyms", tsyms.as_str())])
            .send()
            .await
            .map_err(|e| PriceFeedError::RequestFailed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.map_err(|e| PriceFeedError::RequestFailed(e.to_string()))?;
            return Err(PriceFeedError::QueryError { status: status.as_u16(), message });
        }
        let body =
            response.json::<HashMap<String, Value>>().await.map_err(|e| PriceFeedError::JsonError(e.to_string()))?;
        parse_prices(body)
    }

    /// Fetches prices and stores them. Returns the number of prices stored.
    pub async fn update<B: ExchangeRates>(&self, api: &ExchangeRateApi<B>) -> Result<usize, WorkerError> {
        let prices = self.fetch_prices().await?;
        let n = api.set_prices(prices).await?;
        info!("💱️ {n} XMR prices updated");
        Ok(n)
    }
}

/// Picks the supported currencies out of a price feed response. Unknown codes are skipped.
pub fn parse_prices(body: HashMap<String, Value>) -> Result<HashMap<Currency, f64>, PriceFeedError> {
    if let Some(Value::String(message)) = body.get("Message") {
        return Err(PriceFeedError::QueryError { status: 200, message: message.clone() });
    }
    let prices = body
        .into_iter()
        .filter_map(|(code, price)| {
            let currency = code.parse::<Currency>().map_err(|_| trace!("💱️ Skipping {code} from the price feed")).ok()?;
            let price = price.as_f64().or_else(|| {
                warn!("💱️ The price feed sent {price} for {code}, which is not a number");
                None
            })?;
            Some((currency, price))
        })
        .collect::<HashMap<Currency, f64>>();
    if prices.is_empty() {
        return Err(PriceFeedError::NoPrices);
    }
    Ok(prices)
}
