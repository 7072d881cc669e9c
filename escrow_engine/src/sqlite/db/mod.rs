//! # SQLite Database methods
//!
//! Low-level SQLite interactions for the escrow engine.
//!
//! Everything here is a plain function that takes a `&mut SqliteConnection`. Callers decide on atomicity: pass a
//! pooled connection for a one-off statement, or open a transaction and pass `&mut *tx` to compose several calls into
//! one unit of work.
//!
//! State changes that can race (order status changes, balance debits, invoice address assignment, deposit crediting)
//! are written as conditional `UPDATE`s, so the database arbitrates between concurrent callers.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod catalog;
pub mod disputes;
pub mod exchange_rates;
pub mod invoices;
pub mod jobs;
pub mod orders;
pub mod reviews;
pub mod wallets;
pub mod withdrawals;

const SQLITE_DB_URL: &str = "sqlite://data/escrow.db";

pub fn db_url() -> String {
    let result = env::var("ESC_DATABASE_URL").unwrap_or_else(|_| {
        info!("ESC_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

/// True if the error is the database rejecting a row because it breaks a `CHECK` constraint
pub fn is_check_violation(e: &SqlxError) -> bool {
    matches!(e, SqlxError::Database(d) if d.is_check_violation())
}

/// True if the error is the database rejecting a row because it breaks a `UNIQUE` constraint
pub fn is_unique_violation(e: &SqlxError) -> bool {
    matches!(e, SqlxError::Database(d) if d.is_unique_violation())
}
