use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::db_types::{Invoice, InvoiceId, InvoiceStatus, OrderId, Piconero};

pub async fn insert_invoice(
    amount: Piconero,
    permanent: bool,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Invoice, sqlx::Error> {
    let invoice: Invoice = sqlx::query_as(
        r#"
        INSERT INTO invoices (amount_expected, amount_unlocked, status, permanent, created_at, updated_at)
        VALUES ($1, 0, $2, $3, $4, $4)
        RETURNING *
        "#,
    )
    .bind(amount)
    .bind(InvoiceStatus::Pending)
    .bind(permanent)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("🧾️ Invoice {} created for {amount}", invoice.id);
    Ok(invoice)
}

pub async fn fetch_invoice(id: InvoiceId, conn: &mut SqliteConnection) -> Result<Option<Invoice>, sqlx::Error> {
    let invoice = sqlx::query_as("SELECT * FROM invoices WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(invoice)
}

pub async fn fetch_invoice_for_order(
    order_id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Invoice>, sqlx::Error> {
    let invoice = sqlx::query_as(
        r#"
        SELECT invoices.* FROM invoices
        JOIN order_invoices ON order_invoices.invoice_id = invoices.id
        WHERE order_invoices.order_id = $1
        "#,
    )
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(invoice)
}

/// Sets the payment address of a pending invoice that does not have one yet. Returns `None` if the invoice does not
/// exist, already has an address, or is no longer pending.
pub async fn attach_address(
    id: InvoiceId,
    address: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Invoice>, sqlx::Error> {
    let invoice = sqlx::query_as(
        r#"
        UPDATE invoices SET address = $1, updated_at = $2
        WHERE id = $3 AND address IS NULL AND status = $4
        RETURNING *
        "#,
    )
    .bind(address)
    .bind(now)
    .bind(id)
    .bind(InvoiceStatus::Pending)
    .fetch_optional(conn)
    .await?;
    Ok(invoice)
}

/// Every pending invoice, with or without an address
pub async fn fetch_pending_invoices(conn: &mut SqliteConnection) -> Result<Vec<Invoice>, sqlx::Error> {
    let invoices = sqlx::query_as("SELECT * FROM invoices WHERE status = $1 ORDER BY id")
        .bind(InvoiceStatus::Pending)
        .fetch_all(conn)
        .await?;
    Ok(invoices)
}

/// Raises `amount_unlocked` to `amount_unlocked` if it is higher than the stored value, and applies `status` if the
/// invoice is still pending. Returns `None` if the invoice does not exist.
pub async fn update_progress(
    id: InvoiceId,
    amount_unlocked: Piconero,
    status: Option<InvoiceStatus>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Invoice>, sqlx::Error> {
    let invoice: Option<Invoice> = sqlx::query_as(
        r#"
        UPDATE invoices SET
            amount_unlocked = MAX(amount_unlocked, $1),
            status = CASE WHEN status = $2 AND $3 IS NOT NULL THEN $3 ELSE status END,
            updated_at = $4
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(amount_unlocked)
    .bind(InvoiceStatus::Pending)
    .bind(status)
    .bind(now)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    if let Some(inv) = &invoice {
        trace!("🧾️ Invoice {id} has {} unlocked of {} and is {}", inv.amount_unlocked, inv.amount_expected, inv.status);
    }
    Ok(invoice)
}
