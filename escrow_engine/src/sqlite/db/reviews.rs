use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{NewReview, OrderId, ProductReview, Review};

/// Inserts the order review and its product reviews. Not atomic on its own.
pub async fn insert_review(
    review: &NewReview,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Review, sqlx::Error> {
    let record: Review =
        sqlx::query_as("INSERT INTO reviews (order_id, grade, comment, created_at) VALUES ($1, $2, $3, $4) RETURNING *")
            .bind(review.order_id)
            .bind(review.grade)
            .bind(&review.comment)
            .bind(now)
            .fetch_one(&mut *conn)
            .await?;
    for pr in &review.product_reviews {
        sqlx::query("INSERT INTO product_reviews (order_id, product_id, grade, comment) VALUES ($1, $2, $3, $4)")
            .bind(review.order_id)
            .bind(pr.product_id)
            .bind(pr.grade)
            .bind(&pr.comment)
            .execute(&mut *conn)
            .await?;
    }
    Ok(record)
}

pub async fn fetch_review(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Review>, sqlx::Error> {
    let review = sqlx::query_as("SELECT * FROM reviews WHERE order_id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(review)
}

pub async fn fetch_product_reviews(
    order_id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<ProductReview>, sqlx::Error> {
    let reviews = sqlx::query_as("SELECT * FROM product_reviews WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(reviews)
}
