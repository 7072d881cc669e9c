//! Read access to the marketplace catalog, plus the inventory and cart mutations an order makes.
//!
//! The catalog itself is owned by the marketplace. The insert helpers at the bottom of this module exist so that
//! tooling and tests can seed a database.
use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{CartLine, DeliveryMethod, DeliveryMethodId, PriceTierId, ProductId, UserId};

pub async fn fetch_delivery_method(
    id: DeliveryMethodId,
    conn: &mut SqliteConnection,
) -> Result<Option<DeliveryMethod>, sqlx::Error> {
    let dm = sqlx::query_as("SELECT * FROM delivery_methods WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(dm)
}

pub async fn fetch_cart_lines(
    customer_id: UserId,
    vendor_id: UserId,
    conn: &mut SqliteConnection,
) -> Result<Vec<CartLine>, sqlx::Error> {
    let lines = sqlx::query_as(
        r#"
        SELECT
            cart_items.price_tier_id AS price_tier_id,
            price_tiers.product_id AS product_id,
            products.vendor_id AS vendor_id,
            cart_items.count AS count,
            price_tiers.quantity AS tier_quantity,
            price_tiers.price_cent AS price_cent,
            price_tiers.deleted_at AS tier_deleted_at
        FROM cart_items
        JOIN price_tiers ON price_tiers.id = cart_items.price_tier_id
        JOIN products ON products.id = price_tiers.product_id
        WHERE cart_items.customer_id = $1 AND products.vendor_id = $2
        ORDER BY cart_items.price_tier_id
        "#,
    )
    .bind(customer_id)
    .bind(vendor_id)
    .fetch_all(conn)
    .await?;
    Ok(lines)
}

/// Removes the given price tiers from the customer's cart
pub async fn clear_cart_lines(
    customer_id: UserId,
    tiers: &[PriceTierId],
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let mut removed = 0;
    for tier in tiers {
        removed += sqlx::query("DELETE FROM cart_items WHERE customer_id = $1 AND price_tier_id = $2")
            .bind(customer_id)
            .bind(*tier)
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }
    trace!("🛒️ Removed {removed} lines from the cart of user {customer_id}");
    Ok(removed)
}

/// Decrements product inventory. The `inventory >= 0` constraint on the table rejects the update if there is not
/// enough stock, which surfaces as a check-violation database error.
pub async fn decrement_inventory(
    product_id: ProductId,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE products SET inventory = inventory - $1 WHERE id = $2")
        .bind(quantity)
        .bind(product_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_inventory(product_id: ProductId, conn: &mut SqliteConnection) -> Result<Option<i64>, sqlx::Error> {
    let inventory =
        sqlx::query_scalar("SELECT inventory FROM products WHERE id = $1").bind(product_id).fetch_optional(conn).await?;
    Ok(inventory)
}

pub async fn insert_delivery_method(
    vendor_id: UserId,
    description: &str,
    price_cent: i64,
    conn: &mut SqliteConnection,
) -> Result<DeliveryMethod, sqlx::Error> {
    let dm = sqlx::query_as(
        "INSERT INTO delivery_methods (vendor_id, description, price_cent) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(vendor_id)
    .bind(description)
    .bind(price_cent)
    .fetch_one(conn)
    .await?;
    Ok(dm)
}

pub async fn delete_delivery_method(
    id: DeliveryMethodId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE delivery_methods SET deleted_at = $1 WHERE id = $2").bind(now).bind(id).execute(conn).await?;
    Ok(())
}

pub async fn insert_product(
    vendor_id: UserId,
    title: &str,
    inventory: i64,
    conn: &mut SqliteConnection,
) -> Result<ProductId, sqlx::Error> {
    let id = sqlx::query_scalar("INSERT INTO products (vendor_id, title, inventory) VALUES ($1, $2, $3) RETURNING id")
        .bind(vendor_id)
        .bind(title)
        .bind(inventory)
        .fetch_one(conn)
        .await?;
    Ok(id)
}

pub async fn insert_price_tier(
    product_id: ProductId,
    quantity: i64,
    price_cent: i64,
    conn: &mut SqliteConnection,
) -> Result<PriceTierId, sqlx::Error> {
    let id = sqlx::query_scalar(
        "INSERT INTO price_tiers (product_id, quantity, price_cent) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(product_id)
    .bind(quantity)
    .bind(price_cent)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn delete_price_tier(
    id: PriceTierId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE price_tiers SET deleted_at = $1 WHERE id = $2").bind(now).bind(id).execute(conn).await?;
    Ok(())
}

/// Adds `count` of a price tier to the customer's cart, on top of whatever is already there
pub async fn add_to_cart(
    customer_id: UserId,
    tier: PriceTierId,
    count: i64,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO cart_items (customer_id, price_tier_id, count) VALUES ($1, $2, $3)
        ON CONFLICT (customer_id, price_tier_id) DO UPDATE SET count = count + excluded.count
        "#,
    )
    .bind(customer_id)
    .bind(tier)
    .bind(count)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn cart_size(customer_id: UserId, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}
