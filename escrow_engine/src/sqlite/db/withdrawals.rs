use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::db_types::{
    Piconero,
    Transaction,
    TransactionId,
    UserId,
    WalletId,
    Withdrawal,
    WithdrawalId,
    WithdrawalStatus,
};

pub async fn insert_withdrawal(
    wallet_id: WalletId,
    destination: &str,
    amount: Piconero,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Withdrawal, sqlx::Error> {
    let withdrawal: Withdrawal = sqlx::query_as(
        r#"
        INSERT INTO withdrawals (wallet_id, destination_address, amount, status, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(wallet_id)
    .bind(destination)
    .bind(amount)
    .bind(WithdrawalStatus::Pending)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("💸️ Withdrawal {} of {amount} queued for {destination}", withdrawal.id);
    Ok(withdrawal)
}

pub async fn fetch_withdrawals_for_user(
    user_id: UserId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Withdrawal>, sqlx::Error> {
    let withdrawals = sqlx::query_as(
        r#"
        SELECT withdrawals.* FROM withdrawals
        JOIN wallets ON wallets.id = withdrawals.wallet_id
        WHERE wallets.user_id = $1
        ORDER BY withdrawals.id
        "#,
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    Ok(withdrawals)
}

/// Marks every pending withdrawal as processing and returns the rows that were claimed
pub async fn claim_pending(conn: &mut SqliteConnection) -> Result<Vec<Withdrawal>, sqlx::Error> {
    let mut claimed: Vec<Withdrawal> = sqlx::query_as("UPDATE withdrawals SET status = $1 WHERE status = $2 RETURNING *")
        .bind(WithdrawalStatus::Processing)
        .bind(WithdrawalStatus::Pending)
        .fetch_all(conn)
        .await?;
    claimed.sort_by_key(|w| w.id);
    trace!("💸️ Claimed {} pending withdrawals", claimed.len());
    Ok(claimed)
}

/// Moves processing withdrawals back to pending
pub async fn release(ids: &[WithdrawalId], conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE withdrawals SET status = ");
    builder.push_bind(WithdrawalStatus::Pending);
    builder.push(" WHERE status = ");
    builder.push_bind(WithdrawalStatus::Processing);
    builder.push(" AND id IN (");
    let mut list = builder.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    builder.push(")");
    let released = builder.build().execute(conn).await?.rows_affected();
    Ok(released)
}

pub async fn delete_withdrawals(ids: &[WithdrawalId], conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM withdrawals WHERE id IN (");
    let mut list = builder.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    builder.push(")");
    let deleted = builder.build().execute(conn).await?.rows_affected();
    Ok(deleted)
}

pub async fn insert_transaction(
    hash: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Transaction, sqlx::Error> {
    let tx = sqlx::query_as("INSERT INTO transactions (hash, created_at) VALUES ($1, $2) RETURNING *")
        .bind(hash)
        .bind(now)
        .fetch_one(conn)
        .await?;
    Ok(tx)
}

pub async fn fetch_transactions(conn: &mut SqliteConnection) -> Result<Vec<Transaction>, sqlx::Error> {
    let txs = sqlx::query_as("SELECT * FROM transactions ORDER BY id").fetch_all(conn).await?;
    Ok(txs)
}

pub async fn delete_transaction(id: TransactionId, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let deleted = sqlx::query("DELETE FROM transactions WHERE id = $1").bind(id).execute(conn).await?.rows_affected();
    Ok(deleted)
}
