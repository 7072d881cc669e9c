use escrow_engine::traits::{ExchangeRateError, ProviderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Could not initialize the worker. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the worker. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid worker configuration. {0}")]
    ConfigurationError(String),
    #[error("Could not fetch prices. {0}")]
    PriceFeedError(#[from] PriceFeedError),
    #[error("Could not store prices. {0}")]
    ExchangeRateError(#[from] ExchangeRateError),
    #[error("Payment provider error. {0}")]
    ProviderError(#[from] ProviderError),
}

#[derive(Debug, Clone, Error)]
pub enum PriceFeedError {
    #[error("Could not reach the price feed. {0}")]
    RequestFailed(String),
    #[error("The price feed returned an error. Status {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Could not read the price feed response. {0}")]
    JsonError(String),
    #[error("The price feed returned no usable prices")]
    NoPrices,
    #[error("Invalid price feed proxy. {0}")]
    InvalidProxy(String),
}
