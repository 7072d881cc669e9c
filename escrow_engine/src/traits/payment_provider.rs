use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::Piconero;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("The payment provider did not respond within {0} seconds")]
    Timeout(u64),
    #[error("Could not reach the payment provider. {0}")]
    RequestFailed(String),
    #[error("The payment provider returned an error. Status {status}. {message}")]
    InvalidResponse { status: u16, message: String },
    #[error("Could not read the payment provider response. {0}")]
    DeserializationError(String),
    #[error("The payment provider rejected the amount. {0}")]
    InvalidAmount(String),
    #[error("The payment provider does not know about {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceStatusReport {
    pub amount_unlocked: Piconero,
    pub amount_total: Piconero,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub address: String,
    pub amount: Piconero,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub tx_hash_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferStatusReport {
    pub destinations: Vec<Destination>,
    pub confirmations: u64,
    pub failed: bool,
}

/// The contract the settlement core expects from an external payment processor.
///
/// Implementations should not retry internally. The reconciliation jobs call them again on their next run.
#[allow(async_fn_in_trait)]
pub trait PaymentProvider {
    /// Allocates a fresh receiving address for `amount`. `callback_url` may be empty.
    async fn invoice(&self, amount: Piconero, callback_url: &str) -> Result<String, ProviderError>;

    async fn invoice_status(&self, address: &str) -> Result<InvoiceStatusReport, ProviderError>;

    async fn delete_invoice(&self, address: &str) -> Result<(), ProviderError>;

    /// Sends all destinations in a single batch
    async fn transfer(&self, destinations: &[Destination]) -> Result<TransferReceipt, ProviderError>;

    async fn transfer_status(&self, tx_hash: &str) -> Result<TransferStatusReport, ProviderError>;
}

/// Runs a provider call, giving up with [`ProviderError::Timeout`] once `limit` has passed
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ProviderError>
where F: Future<Output = Result<T, ProviderError>> {
    tokio::time::timeout(limit, call).await.map_err(|_| ProviderError::Timeout(limit.as_secs()))?
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn slow_calls_time_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ProviderError>(1)
        };
        let err = with_timeout(Duration::from_millis(10), slow).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(0)));
        let fast = async { Ok::<_, ProviderError>(2) };
        assert_eq!(with_timeout(Duration::from_secs(1), fast).await.unwrap(), 2);
    }
}
