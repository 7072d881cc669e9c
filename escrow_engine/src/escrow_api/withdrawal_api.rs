use std::{fmt::Debug, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{
    db_types::{Piconero, UserId, Withdrawal, WithdrawalId},
    traits::{with_timeout, Destination, JobReport, PaymentProvider, WithdrawalError, WithdrawalManagement},
};

/// The flat fee withheld from every withdrawal, in piconero
pub const WITHDRAWAL_FEE: Piconero = Piconero::new(100_000_000);
/// A transfer is considered final at this depth
pub const REQUIRED_CONFIRMATIONS: u64 = 10;
/// Transfers younger than this are not polled yet
pub const TRANSFER_SETTLE_TIME: Duration = Duration::minutes(15);

pub struct WithdrawalApi<B, P> {
    db: B,
    provider: P,
    provider_timeout: StdDuration,
}

impl<B, P> Debug for WithdrawalApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WithdrawalApi")
    }
}

impl<B, P> WithdrawalApi<B, P> {
    pub fn new(db: B, provider: P, provider_timeout: StdDuration) -> Self {
        Self { db, provider, provider_timeout }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, P> WithdrawalApi<B, P>
where
    B: WithdrawalManagement,
    P: PaymentProvider,
{
    /// Debits `amount` from the user's wallet and queues a withdrawal of `amount` less the withdrawal fee to
    /// `destination`. Returns the amount that will be sent.
    pub async fn withdraw_funds(
        &self,
        user_id: UserId,
        destination: &str,
        amount: Piconero,
    ) -> Result<Piconero, WithdrawalError> {
        if amount <= WITHDRAWAL_FEE {
            return Err(WithdrawalError::WithdrawalAmountTooSmall(WITHDRAWAL_FEE));
        }
        let withdrawal = self.db.create_withdrawal(user_id, destination, amount, WITHDRAWAL_FEE).await?;
        info!("💸️ User {user_id} withdraws {} to {destination}", withdrawal.amount);
        Ok(withdrawal.amount)
    }

    pub async fn withdrawals_for_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>, WithdrawalError> {
        self.db.fetch_withdrawals_for_user(user_id).await
    }

    /// Sends all pending withdrawals, then follows up on transfers already in flight
    pub async fn handle_withdrawals(&self, now: DateTime<Utc>) -> Result<JobReport, WithdrawalError> {
        let sent = self.transfer_withdrawals(now).await?;
        let settled = self.handle_transactions(now).await?;
        Ok(sent.merge(settled))
    }

    /// Batches every pending withdrawal into a single provider transfer.
    ///
    /// The withdrawals are claimed (moved to `processing`) first. If the transfer fails they are put back to `pending`
    /// for the next run. Once the transfer has gone out they are deleted and one transaction is recorded per hash.
    pub async fn transfer_withdrawals(&self, now: DateTime<Utc>) -> Result<JobReport, WithdrawalError> {
        let claimed = self.db.claim_pending_withdrawals().await?;
        if claimed.is_empty() {
            return Ok(JobReport::default());
        }
        let ids = claimed.iter().map(|w| w.id).collect::<Vec<WithdrawalId>>();
        let destinations = claimed
            .iter()
            .map(|w| Destination { address: w.destination_address.clone(), amount: w.amount })
            .collect::<Vec<Destination>>();
        let total = claimed.iter().map(|w| w.amount).sum::<Piconero>();
        debug!("💸️ Sending {} withdrawals totalling {total}", ids.len());
        let receipt = match with_timeout(self.provider_timeout, self.provider.transfer(&destinations)).await {
            Ok(r) => r,
            Err(e) => {
                warn!("💸️ Transfer of {} withdrawals failed. They will be retried. {e}", ids.len());
                match self.db.release_withdrawals(&ids).await {
                    Ok(n) => debug!("💸️ {n} withdrawals returned to pending"),
                    Err(release_err) => {
                        error!("💸️ Could not return withdrawals {ids:?} to pending. {release_err}")
                    },
                }
                return Err(e.into());
            },
        };
        match self.db.complete_withdrawals(&ids, &receipt.tx_hash_list, now).await {
            Ok(txs) => {
                info!("💸️ {} withdrawals sent in {} transactions", ids.len(), txs.len());
                Ok(JobReport { processed: ids.len(), ..Default::default() })
            },
            Err(e) => {
                // The funds have left the wallet. Leaving the rows in `processing` keeps them from being sent twice.
                error!(
                    "💸️ Withdrawals {ids:?} were sent in {:?} but could not be marked as such. They remain in \
                     processing and need manual attention. {e}",
                    receipt.tx_hash_list
                );
                Err(e)
            },
        }
    }

    /// Polls the status of every in-flight transfer older than [`TRANSFER_SETTLE_TIME`]. Transfers with enough
    /// confirmations are forgotten. Failed transfers are logged and left in place.
    pub async fn handle_transactions(&self, now: DateTime<Utc>) -> Result<JobReport, WithdrawalError> {
        let transactions = self.db.fetch_transactions().await?;
        let mut report = JobReport::default();
        for tx in transactions.into_iter().filter(|tx| now - tx.created_at > TRANSFER_SETTLE_TIME) {
            let status = with_timeout(self.provider_timeout, self.provider.transfer_status(&tx.hash)).await?;
            if status.failed {
                error!("💸️ Transfer {} failed at the provider. It needs manual attention.", tx.hash);
                report.failed += 1;
            } else if status.confirmations >= REQUIRED_CONFIRMATIONS {
                self.db.delete_transaction(tx.id).await?;
                debug!("💸️ Transfer {} is confirmed", tx.hash);
                report.processed += 1;
            } else {
                trace!("💸️ Transfer {} has {} confirmations", tx.hash, status.confirmations);
                report.skipped += 1;
            }
        }
        Ok(report)
    }
}
