use thiserror::Error;

use crate::db_types::{Piconero, UserId, Wallet};

#[derive(Debug, Clone, Error)]
pub enum WalletError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User {0} does not have a wallet")]
    WalletNotFound(UserId),
    #[error("User {0} already has a wallet")]
    WalletAlreadyExists(UserId),
    #[error("The wallet of user {user_id} holds {balance}, which is less than {requested}")]
    InsufficientBalance { user_id: UserId, balance: Piconero, requested: Piconero },
    #[error("Wallet amounts must be positive, but got {0}")]
    InvalidAmount(Piconero),
}

impl From<sqlx::Error> for WalletError {
    fn from(e: sqlx::Error) -> Self {
        WalletError::DatabaseError(e.to_string())
    }
}

/// The escrow ledger.
///
/// Balances only change through [`Self::add_balance`] and [`Self::reduce_balance`]. The latter is a single conditional
/// update, so a balance can never go negative regardless of how many callers race on the same wallet.
#[allow(async_fn_in_trait)]
pub trait WalletManagement {
    /// Creates the wallet for a user, together with its permanent deposit invoice. The job that assigns the deposit
    /// address is enqueued in the same transaction.
    async fn create_wallet(&self, user_id: UserId) -> Result<Wallet, WalletError>;

    async fn fetch_wallet_for_user(&self, user_id: UserId) -> Result<Option<Wallet>, WalletError>;

    async fn add_balance(&self, user_id: UserId, amount: Piconero) -> Result<Wallet, WalletError>;

    /// Debits the wallet if, and only if, the balance covers `amount`. Fails with
    /// [`WalletError::InsufficientBalance`] otherwise, leaving the balance untouched.
    async fn reduce_balance(&self, user_id: UserId, amount: Piconero) -> Result<Wallet, WalletError>;

    /// The address of the user's permanent deposit invoice, once it has been assigned
    async fn deposit_address(&self, user_id: UserId) -> Result<Option<String>, WalletError>;
}
