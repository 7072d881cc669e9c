//! The escrow ledger.
//!
//! Balances are never read, modified in Rust and written back. Every mutation is a single `UPDATE` that does the
//! arithmetic in the database, and debits carry their own guard (`balance >= amount`) in the `WHERE` clause.
use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::db_types::{Deposit, DepositProgress, InvoiceId, Piconero, UserId, Wallet, WalletId};

pub async fn insert_wallet(
    user_id: UserId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Wallet, sqlx::Error> {
    let wallet = sqlx::query_as(
        "INSERT INTO wallets (user_id, balance, created_at, updated_at) VALUES ($1, 0, $2, $2) RETURNING *",
    )
    .bind(user_id)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("👛️ Wallet created for user {user_id}");
    Ok(wallet)
}

pub async fn fetch_wallet_for_user(
    user_id: UserId,
    conn: &mut SqliteConnection,
) -> Result<Option<Wallet>, sqlx::Error> {
    let wallet =
        sqlx::query_as("SELECT * FROM wallets WHERE user_id = $1").bind(user_id).fetch_optional(conn).await?;
    Ok(wallet)
}

/// Credits the user's wallet. Returns `None` if the user has no wallet.
pub async fn add_balance(
    user_id: UserId,
    amount: Piconero,
    conn: &mut SqliteConnection,
) -> Result<Option<Wallet>, sqlx::Error> {
    let wallet: Option<Wallet> = sqlx::query_as(
        "UPDATE wallets SET balance = balance + $1, updated_at = $2 WHERE user_id = $3 RETURNING *",
    )
    .bind(amount)
    .bind(Utc::now())
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    if let Some(w) = &wallet {
        trace!("👛️ Credited {amount} to wallet {}. Balance is now {}", w.id, w.balance);
    }
    Ok(wallet)
}

/// Debits the user's wallet if the balance covers `amount`. Returns `None` if nothing was debited, either because
/// the balance was too low or because the user has no wallet.
pub async fn reduce_balance(
    user_id: UserId,
    amount: Piconero,
    conn: &mut SqliteConnection,
) -> Result<Option<Wallet>, sqlx::Error> {
    let wallet: Option<Wallet> = sqlx::query_as(
        r#"
        UPDATE wallets SET balance = balance - $1, updated_at = $2
        WHERE user_id = $3 AND balance >= $1
        RETURNING *
        "#,
    )
    .bind(amount)
    .bind(Utc::now())
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    if let Some(w) = &wallet {
        trace!("👛️ Debited {amount} from wallet {}. Balance is now {}", w.id, w.balance);
    }
    Ok(wallet)
}

pub async fn insert_deposit(
    wallet_id: WalletId,
    invoice_id: InvoiceId,
    conn: &mut SqliteConnection,
) -> Result<Deposit, sqlx::Error> {
    let deposit = sqlx::query_as(
        "INSERT INTO deposits (wallet_id, invoice_id, amount_deposited) VALUES ($1, $2, 0) RETURNING *",
    )
    .bind(wallet_id)
    .bind(invoice_id)
    .fetch_one(conn)
    .await?;
    Ok(deposit)
}

pub async fn deposit_address(user_id: UserId, conn: &mut SqliteConnection) -> Result<Option<String>, sqlx::Error> {
    let address: Option<Option<String>> = sqlx::query_scalar(
        r#"
        SELECT invoices.address FROM wallets
        JOIN deposits ON deposits.wallet_id = wallets.id
        JOIN invoices ON invoices.id = deposits.invoice_id
        WHERE wallets.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(address.flatten())
}

pub async fn fetch_deposit_progress(conn: &mut SqliteConnection) -> Result<Vec<DepositProgress>, sqlx::Error> {
    let deposits = sqlx::query_as(
        r#"
        SELECT
            deposits.id AS deposit_id,
            wallets.user_id AS user_id,
            deposits.amount_deposited AS amount_deposited,
            invoices.amount_unlocked AS amount_unlocked
        FROM deposits
        JOIN wallets ON wallets.id = deposits.wallet_id
        JOIN invoices ON invoices.id = deposits.invoice_id
        ORDER BY deposits.id
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(deposits)
}

/// Moves `amount_deposited` from `expected` to `new_amount`. Returns false if `amount_deposited` no longer equals
/// `expected`, i.e. someone else has already credited this deposit.
pub async fn advance_deposit(
    progress: &DepositProgress,
    new_amount: Piconero,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE deposits SET amount_deposited = $1 WHERE id = $2 AND amount_deposited = $3")
        .bind(new_amount)
        .bind(progress.deposit_id)
        .bind(progress.amount_deposited)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}
