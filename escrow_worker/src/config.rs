use std::{env, time::Duration as StdDuration};

use chrono::Duration;
use esc_common::parse_boolean_flag;
use escrow_engine::OrderWindows;
use log::*;

const DEFAULT_ESC_HOST: &str = "127.0.0.1";
const DEFAULT_ESC_PORT: u16 = 8370;
const DEFAULT_MONEROPAY_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_PROVIDER_TIMEOUT: StdDuration = StdDuration::from_secs(20);
pub const DEFAULT_PRICE_FEED_URL: &str = "https://min-api.cryptocompare.com/data/price";
const DEFAULT_PRICE_FEED_INTERVAL: Duration = Duration::minutes(15);

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Interface the health check endpoint listens on
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Apply the embedded schema migrations at start-up
    pub run_migrations: bool,
    /// Base URL of the MoneroPay instance, without a trailing slash
    pub moneropay_url: String,
    /// Passed to MoneroPay with every new invoice. Empty means no callback.
    pub callback_url: String,
    /// Every call to MoneroPay is abandoned after this long
    pub provider_timeout: StdDuration,
    /// Price API endpoint. The currency codes are appended as query parameters.
    pub price_feed_url: String,
    /// Optional proxy for price requests, e.g. `socks5h://localhost:9050`
    pub price_feed_proxy: Option<String>,
    pub price_feed_interval: Duration,
    pub windows: OrderWindows,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ESC_HOST.to_string(),
            port: DEFAULT_ESC_PORT,
            database_url: String::default(),
            run_migrations: true,
            moneropay_url: DEFAULT_MONEROPAY_URL.to_string(),
            callback_url: String::default(),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            price_feed_url: DEFAULT_PRICE_FEED_URL.to_string(),
            price_feed_proxy: None,
            price_feed_interval: DEFAULT_PRICE_FEED_INTERVAL,
            windows: OrderWindows::default(),
        }
    }
}

impl WorkerConfig {
    pub fn from_env_or_default() -> Self {
        let host = env::var("ESC_HOST").ok().unwrap_or_else(|| DEFAULT_ESC_HOST.into());
        let port = env::var("ESC_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for ESC_PORT. {e} Using the default, {DEFAULT_ESC_PORT}, instead."
                    );
                    DEFAULT_ESC_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_ESC_PORT);
        let database_url = env::var("ESC_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ ESC_DATABASE_URL is not set. Please set it to the URL for the escrow database.");
            String::default()
        });
        let run_migrations = parse_boolean_flag(env::var("ESC_RUN_MIGRATIONS").ok(), true);
        let moneropay_url = env::var("ESC_MONEROPAY_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .ok()
            .unwrap_or_else(|| {
                warn!("🪛️ ESC_MONEROPAY_URL is not set. Using {DEFAULT_MONEROPAY_URL}.");
                DEFAULT_MONEROPAY_URL.into()
            });
        let callback_url = env::var("ESC_MONEROPAY_CALLBACK_URL").ok().unwrap_or_else(|| {
            info!("🪛️ ESC_MONEROPAY_CALLBACK_URL is not set. Payments will only be picked up by polling.");
            String::default()
        });
        let provider_timeout = duration_or_default(
            "ESC_PROVIDER_TIMEOUT_SECS",
            env::var("ESC_PROVIDER_TIMEOUT_SECS").ok(),
            Duration::seconds(DEFAULT_PROVIDER_TIMEOUT.as_secs() as i64),
            Duration::seconds,
        )
        .to_std()
        .unwrap_or(DEFAULT_PROVIDER_TIMEOUT);
        let price_feed_url = env::var("ESC_PRICE_FEED_URL").ok().unwrap_or_else(|| {
            info!("🪛️ ESC_PRICE_FEED_URL is not set. Using {DEFAULT_PRICE_FEED_URL}.");
            DEFAULT_PRICE_FEED_URL.into()
        });
        let price_feed_proxy = env::var("ESC_PRICE_FEED_PROXY").ok().filter(|s| !s.trim().is_empty());
        if let Some(proxy) = &price_feed_proxy {
            info!("🪛️ Price requests will go through {proxy}");
        }
        let price_feed_interval = duration_or_default(
            "ESC_PRICE_FEED_INTERVAL_MINS",
            env::var("ESC_PRICE_FEED_INTERVAL_MINS").ok(),
            DEFAULT_PRICE_FEED_INTERVAL,
            Duration::minutes,
        );
        let windows = configure_order_windows();
        Self {
            host,
            port,
            database_url,
            run_migrations,
            moneropay_url,
            callback_url,
            provider_timeout,
            price_feed_url,
            price_feed_proxy,
            price_feed_interval,
            windows,
        }
    }
}

fn configure_order_windows() -> OrderWindows {
    let defaults = OrderWindows::default();
    let hours =
        |name: &str, default: Duration| duration_or_default(name, env::var(name).ok(), default, Duration::hours);
    OrderWindows {
        invoice_payment: hours("ESC_INVOICE_PAYMENT_WINDOW_HRS", defaults.invoice_payment),
        processing: hours("ESC_ORDER_PROCESSING_WINDOW_HRS", defaults.processing),
        dispatch: hours("ESC_ORDER_DISPATCH_WINDOW_HRS", defaults.dispatch),
        delivery: hours("ESC_ORDER_DELIVERY_WINDOW_HRS", defaults.delivery),
        extend_unavailable: hours("ESC_EXTEND_UNAVAILABLE_WINDOW_HRS", defaults.extend_unavailable),
    }
}

/// Reads a whole number of `unit`s from `value`, falling back to `default` when it is missing, malformed or not
/// positive.
fn duration_or_default(name: &str, value: Option<String>, default: Duration, unit: fn(i64) -> Duration) -> Duration {
    value
        .ok_or_else(|| info!("🪛️ {name} is not set. Using the default value of {default}."))
        .and_then(|s| {
            s.trim().parse::<i64>().map_err(|e| warn!("🪛️ Invalid configuration value for {name}. {e}"))
        })
        .and_then(|n| {
            if n > 0 {
                Ok(unit(n))
            } else {
                warn!("🪛️ {name} must be positive. Using the default value of {default}.");
                Err(())
            }
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn durations_fall_back_to_defaults() {
        let default = Duration::hours(6);
        let read = |v: Option<&str>| duration_or_default("TEST", v.map(String::from), default, Duration::hours);
        assert_eq!(read(Some("12")), Duration::hours(12));
        assert_eq!(read(Some(" 3 ")), Duration::hours(3));
        assert_eq!(read(None), default);
        assert_eq!(read(Some("six")), default);
        assert_eq!(read(Some("0")), default);
        assert_eq!(read(Some("-4")), default);
    }

    #[test]
    fn default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.port, 8370);
        assert_eq!(config.provider_timeout, StdDuration::from_secs(20));
        assert!(config.price_feed_proxy.is_none());
        assert_eq!(config.price_feed_interval, Duration::minutes(15));
        assert_eq!(config.windows.delivery, Duration::days(7));
        assert!(config.callback_url.is_empty());
        assert!(config.run_migrations);
    }
}
