use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

use crate::db_types::{DisputeOffer, DisputeOfferId, DisputeOfferStatus, OrderId};

pub async fn insert_offer(
    order_id: OrderId,
    refund_factor: Decimal,
    status: DisputeOfferStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<DisputeOffer, sqlx::Error> {
    let offer: DisputeOffer = sqlx::query_as(
        r#"
        INSERT INTO dispute_offers (order_id, refund_factor, status, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(refund_factor.to_string())
    .bind(status)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("⚖️ Offer {} ({status}) to refund {refund_factor} of order {order_id}", offer.id);
    Ok(offer)
}

pub async fn fetch_offer(id: DisputeOfferId, conn: &mut SqliteConnection) -> Result<Option<DisputeOffer>, sqlx::Error> {
    let offer = sqlx::query_as("SELECT * FROM dispute_offers WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(offer)
}

/// Offers made for an order, newest first
pub async fn fetch_offers_for_order(
    order_id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<DisputeOffer>, sqlx::Error> {
    let offers = sqlx::query_as("SELECT * FROM dispute_offers WHERE order_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(offers)
}

/// Moves a pending offer to `status`. Returns `None` if the offer does not exist or is no longer pending.
pub async fn resolve_offer(
    id: DisputeOfferId,
    status: DisputeOfferStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<DisputeOffer>, sqlx::Error> {
    let offer = sqlx::query_as("UPDATE dispute_offers SET status = $1 WHERE id = $2 AND status = $3 RETURNING *")
        .bind(status)
        .bind(id)
        .bind(DisputeOfferStatus::Pending)
        .fetch_optional(conn)
        .await?;
    Ok(offer)
}
