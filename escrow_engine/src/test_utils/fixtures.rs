//! Seeds a test database with a small catalog and the objects the flows need.
use chrono::Utc;

use crate::{
    db_types::{DeliveryMethod, DeliveryMethodId, PriceTierId, ProductId, UserId},
    sqlite_db::catalog,
    SqliteDatabase,
};

#[derive(Debug, Clone)]
pub struct SeededProduct {
    pub product_id: ProductId,
    pub price_tier_id: PriceTierId,
}

/// Creates a product with a single-unit price tier
pub async fn seed_product(
    db: &SqliteDatabase,
    vendor_id: UserId,
    title: &str,
    price_cent: i64,
    inventory: i64,
) -> Result<SeededProduct, sqlx::Error> {
    let mut conn = db.pool().acquire().await?;
    let product_id = catalog::insert_product(vendor_id, title, inventory, &mut conn).await?;
    let price_tier_id = catalog::insert_price_tier(product_id, 1, price_cent, &mut conn).await?;
    Ok(SeededProduct { product_id, price_tier_id })
}

pub async fn seed_delivery_method(
    db: &SqliteDatabase,
    vendor_id: UserId,
    price_cent: i64,
) -> Result<DeliveryMethod, sqlx::Error> {
    let mut conn = db.pool().acquire().await?;
    catalog::insert_delivery_method(vendor_id, "Standard shipping", price_cent, &mut conn).await
}

pub async fn delete_delivery_method(db: &SqliteDatabase, id: DeliveryMethodId) -> Result<(), sqlx::Error> {
    let mut conn = db.pool().acquire().await?;
    catalog::delete_delivery_method(id, Utc::now(), &mut conn).await
}

pub async fn add_to_cart(
    db: &SqliteDatabase,
    customer_id: UserId,
    tier: PriceTierId,
    count: i64,
) -> Result<(), sqlx::Error> {
    let mut conn = db.pool().acquire().await?;
    catalog::add_to_cart(customer_id, tier, count, &mut conn).await
}

pub async fn cart_size(db: &SqliteDatabase, customer_id: UserId) -> Result<i64, sqlx::Error> {
    let mut conn = db.pool().acquire().await?;
    catalog::cart_size(customer_id, &mut conn).await
}

pub async fn inventory(db: &SqliteDatabase, product_id: ProductId) -> Result<Option<i64>, sqlx::Error> {
    let mut conn = db.pool().acquire().await?;
    catalog::fetch_inventory(product_id, &mut conn).await
}

pub async fn delete_price_tier(db: &SqliteDatabase, tier: PriceTierId) -> Result<(), sqlx::Error> {
    let mut conn = db.pool().acquire().await?;
    catalog::delete_price_tier(tier, Utc::now(), &mut conn).await
}
