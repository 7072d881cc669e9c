use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Piconero, UserId, Wallet},
    traits::{WalletError, WalletManagement},
};

/// Access to users' escrow wallets
pub struct WalletApi<B> {
    db: B,
}

impl<B> Debug for WalletApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WalletApi")
    }
}

impl<B> WalletApi<B>
where B: WalletManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Opens a wallet for the user. Its deposit address becomes available once the provider has assigned one.
    pub async fn create_wallet(&self, user_id: UserId) -> Result<Wallet, WalletError> {
        let wallet = self.db.create_wallet(user_id).await?;
        debug!("👛️ Wallet {} opened for user {user_id}", wallet.id);
        Ok(wallet)
    }

    pub async fn wallet_for_user(&self, user_id: UserId) -> Result<Option<Wallet>, WalletError> {
        self.db.fetch_wallet_for_user(user_id).await
    }

    pub async fn balance(&self, user_id: UserId) -> Result<Piconero, WalletError> {
        let wallet = self.db.fetch_wallet_for_user(user_id).await?.ok_or(WalletError::WalletNotFound(user_id))?;
        Ok(wallet.balance)
    }

    pub async fn deposit_address(&self, user_id: UserId) -> Result<Option<String>, WalletError> {
        self.db.deposit_address(user_id).await
    }

    pub async fn add_balance(&self, user_id: UserId, amount: Piconero) -> Result<Wallet, WalletError> {
        self.db.add_balance(user_id, amount).await
    }

    /// Debits the wallet, e.g. for a vendor application fee. Never overdraws.
    pub async fn reduce_balance(&self, user_id: UserId, amount: Piconero) -> Result<Wallet, WalletError> {
        let result = self.db.reduce_balance(user_id, amount).await;
        if let Err(WalletError::InsufficientBalance { balance, requested, .. }) = &result {
            debug!("👛️ User {user_id} cannot pay {requested} from a balance of {balance}");
        }
        result
    }
}
