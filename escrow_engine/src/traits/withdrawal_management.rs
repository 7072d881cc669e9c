use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{Piconero, Transaction, TransactionId, UserId, Withdrawal, WithdrawalId},
    traits::ProviderError,
};

#[derive(Debug, Clone, Error)]
pub enum WithdrawalError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User {0} does not have a wallet")]
    WalletNotFound(UserId),
    #[error("The withdrawal amount must be larger than the {0} withdrawal fee")]
    WithdrawalAmountTooSmall(Piconero),
    #[error("The wallet balance is too low for this withdrawal")]
    NotEnoughBalanceToWithdraw,
    #[error("Payment provider error. {0}")]
    ProviderError(#[from] ProviderError),
}

impl From<sqlx::Error> for WithdrawalError {
    fn from(e: sqlx::Error) -> Self {
        WithdrawalError::DatabaseError(e.to_string())
    }
}

#[allow(async_fn_in_trait)]
pub trait WithdrawalManagement {
    /// Debits `amount` from the user's wallet and records a pending withdrawal of `amount - fee`, atomically.
    async fn create_withdrawal(
        &self,
        user_id: UserId,
        destination: &str,
        amount: Piconero,
        fee: Piconero,
    ) -> Result<Withdrawal, WithdrawalError>;

    async fn fetch_withdrawals_for_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>, WithdrawalError>;

    /// Moves every pending withdrawal to `processing` and returns them
    async fn claim_pending_withdrawals(&self) -> Result<Vec<Withdrawal>, WithdrawalError>;

    /// Moves the given `processing` withdrawals back to `pending` so that the next run retries them
    async fn release_withdrawals(&self, ids: &[WithdrawalId]) -> Result<u64, WithdrawalError>;

    /// Deletes the given withdrawals and records one in-flight transaction per hash, atomically
    async fn complete_withdrawals(
        &self,
        ids: &[WithdrawalId],
        tx_hashes: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, WithdrawalError>;

    async fn fetch_transactions(&self) -> Result<Vec<Transaction>, WithdrawalError>;

    async fn delete_transaction(&self, id: TransactionId) -> Result<(), WithdrawalError>;
}
