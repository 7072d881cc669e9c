use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::ExchangeRate;

/// The most recent price for `currency`
pub async fn fetch_last_rate(currency: &str, conn: &mut SqliteConnection) -> Result<Option<ExchangeRate>, sqlx::Error> {
    let rate = sqlx::query_as(
        r#"
        SELECT currency, price, updated_at FROM exchange_rates
        WHERE currency = $1
        ORDER BY updated_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(currency)
    .fetch_optional(conn)
    .await?;
    Ok(rate)
}

/// The most recent price of every currency that has at least one
pub async fn fetch_latest_rates(conn: &mut SqliteConnection) -> Result<Vec<ExchangeRate>, sqlx::Error> {
    let rates = sqlx::query_as(
        r#"
        SELECT currency, price, updated_at FROM exchange_rates
        WHERE id IN (SELECT MAX(id) FROM exchange_rates GROUP BY currency)
        ORDER BY currency
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(rates)
}

pub async fn insert_rate(
    currency: &str,
    price: f64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO exchange_rates (currency, price, updated_at) VALUES ($1, $2, $3)")
        .bind(currency)
        .bind(price)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}
