#![allow(dead_code)]

use escrow_engine::{
    db_types::{DeliveryMethodId, UserId},
    test_utils::{
        fixtures,
        prepare_env::{prepare_test_env, random_db_path},
    },
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const CUSTOMER: UserId = UserId(1);
pub const VENDOR: UserId = UserId(2);

pub async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub async fn tear_down(mut db: SqliteDatabase) {
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    let _ = Sqlite::drop_database(db.url()).await;
}

/// A vendor with one product at `price_cent` and free delivery, with `count` of it in the customer's cart
pub async fn seed_cart(db: &SqliteDatabase, price_cent: i64, count: i64) -> DeliveryMethodId {
    let product = fixtures::seed_product(db, VENDOR, "widget", price_cent, 100).await.expect("Error seeding product");
    let dm = fixtures::seed_delivery_method(db, VENDOR, 0).await.expect("Error seeding delivery");
    fixtures::add_to_cart(db, CUSTOMER, product.price_tier_id, count).await.expect("Error adding to cart");
    dm.id
}
