use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{InvoiceId, InvoiceStatus, NewOrder, Order, OrderId, OrderItem, OrderStatusType, MAX_EXTENDS},
    escrow_api::order_objects::OrderQueryFilter,
    transitions::valid_predecessors,
};

/// Inserts a new order, and all of its items, using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
///
/// The order is created in the `pending` state.
pub async fn insert_order(order: &NewOrder, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let record: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                customer_id,
                vendor_id,
                delivery_method_id,
                status,
                total_price,
                details,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *;
        "#,
    )
    .bind(order.customer_id)
    .bind(order.vendor_id)
    .bind(order.delivery_method_id)
    .bind(OrderStatusType::Pending)
    .bind(order.total_price)
    .bind(&order.details)
    .bind(order.created_at)
    .fetch_one(&mut *conn)
    .await?;
    for item in &order.items {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, product_id, price_tier_id, count, quantity, unit_price_cent)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(item.product_id)
        .bind(item.price_tier_id)
        .bind(item.count)
        .bind(item.quantity)
        .bind(item.unit_price_cent)
        .execute(&mut *conn)
        .await?;
    }
    debug!("📝️ Order {} inserted with {} items for {}", record.id, order.items.len(), record.total_price);
    Ok(record)
}

pub async fn fetch_order(id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_items(id: OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items =
        sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id").bind(id).fetch_all(conn).await?;
    Ok(items)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in ascending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(cid) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(cid);
    }
    if let Some(vid) = query.vendor_id {
        where_clause.push("vendor_id = ");
        where_clause.push_bind_unseparated(vid);
    }
    if let Some(statuses) = query.status.filter(|s| !s.is_empty()) {
        where_clause.push("status IN (");
        for (i, status) in statuses.into_iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status);
        }
        where_clause.push_unseparated(")");
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC, id ASC");
    trace!("📝️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("📝️ Result of search_orders: {:?}", orders.len());
    Ok(orders)
}

pub async fn fetch_pending_orders_with_invoice_status(
    status: InvoiceStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        r#"
        SELECT orders.* FROM orders
        JOIN order_invoices ON order_invoices.order_id = orders.id
        JOIN invoices ON invoices.id = order_invoices.invoice_id
        WHERE orders.status = $1 AND invoices.status = $2
        ORDER BY orders.id
        "#,
    )
    .bind(OrderStatusType::Pending)
    .bind(status)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// Moves an order to `target`, if and only if its current status is one of the valid predecessors of `target`.
///
/// This is a single conditional `UPDATE`, so it is safe against concurrent transitions of the same order. Returns
/// `None` if no row was changed, either because the order does not exist or because its status did not allow the
/// move. Timestamps for `accepted` and `dispatched` are recorded alongside the status.
pub async fn update_order_status(
    id: OrderId,
    target: OrderStatusType,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let from = valid_predecessors(target);
    if from.is_empty() {
        return Ok(None);
    }
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET status = ");
    builder.push_bind(target);
    builder.push(", updated_at = ");
    builder.push_bind(now);
    match target {
        OrderStatusType::Accepted => {
            builder.push(", accepted_at = ");
            builder.push_bind(now);
        },
        OrderStatusType::Dispatched => {
            builder.push(", dispatched_at = ");
            builder.push_bind(now);
        },
        _ => {},
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" AND status IN (");
    let mut statuses = builder.separated(", ");
    for status in from {
        statuses.push_bind(*status);
    }
    builder.push(") RETURNING *");
    let order = builder.build_query_as::<Order>().fetch_optional(conn).await?;
    if let Some(o) = &order {
        trace!("📝️ Order {id} is now {}", o.status);
    }
    Ok(order)
}

/// Increments the extension counter of a dispatched order, as long as it is below the maximum.
pub async fn increment_extends(
    id: OrderId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
        UPDATE orders SET num_extends = num_extends + 1, updated_at = $1
        WHERE id = $2 AND status = $3 AND num_extends < $4
        RETURNING *
        "#,
    )
    .bind(now)
    .bind(id)
    .bind(OrderStatusType::Dispatched)
    .bind(MAX_EXTENDS)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn link_invoice(
    order_id: OrderId,
    invoice_id: InvoiceId,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO order_invoices (order_id, invoice_id) VALUES ($1, $2)")
        .bind(order_id)
        .bind(invoice_id)
        .execute(conn)
        .await?;
    trace!("📝️ Order {order_id} is paid by invoice {invoice_id}");
    Ok(())
}
