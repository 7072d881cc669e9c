//! Data types persisted by the escrow engine.
//!
//! Identifiers are integer newtypes so that an `InvoiceId` can never be passed where an `OrderId` is expected.
//! Statuses are stored as lowercase text.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use esc_common::Piconero;
use log::error;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, Type};
use thiserror::Error;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "#{}", self.0)
            }
        }

        impl $name {
            pub fn value(&self) -> i64 {
                self.0
            }
        }
    };
}

id_type!(OrderId);
id_type!(UserId);
id_type!(WalletId);
id_type!(InvoiceId);
id_type!(DepositId);
id_type!(WithdrawalId);
id_type!(TransactionId);
id_type!(DisputeOfferId);
id_type!(JobId);
id_type!(ProductId);
id_type!(PriceTierId);
id_type!(DeliveryMethodId);

#[derive(Debug, Clone, Error)]
#[error("Invalid {kind}: {value}")]
pub struct ConversionError {
    kind: &'static str,
    value: String,
}

impl ConversionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

/// Generates `Display`, `FromStr` and a lossy `From<String>` for a unit-only status enum stored as lowercase text.
macro_rules! status_strings {
    ($name:ident, $kind:literal, $fallback:ident, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $( $name::$variant => write!(f, $text), )+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok(Self::$variant), )+
                    s => Err(ConversionError::new($kind, s)),
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                value.parse().unwrap_or_else(|_| {
                    error!(
                        "Invalid {}: {value}. But this conversion cannot fail. Defaulting to {}",
                        $kind,
                        $name::$fallback
                    );
                    $name::$fallback
                })
            }
        }
    };
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatusType {
    /// The order has been created and is waiting for payment.
    Pending,
    /// Payment has been received in full and is held in escrow.
    Paid,
    /// The vendor has accepted the order. Inventory has been reserved.
    Accepted,
    /// The vendor has shipped the order.
    Dispatched,
    /// The customer confirmed delivery (or the delivery window lapsed). The vendor has been paid.
    Finalized,
    /// The customer has raised a dispute on a dispatched order.
    Disputed,
    /// A dispute was resolved and the escrow split between the parties.
    Settled,
    /// The order was cancelled before payment.
    Cancelled,
    /// The vendor declined (or never handled) the order. The customer has been refunded.
    Declined,
}

status_strings!(OrderStatusType, "order status", Pending, {
    Pending => "pending",
    Paid => "paid",
    Accepted => "accepted",
    Dispatched => "dispatched",
    Finalized => "finalized",
    Disputed => "disputed",
    Settled => "settled",
    Cancelled => "cancelled",
    Declined => "declined",
});

impl OrderStatusType {
    pub const ALL: [OrderStatusType; 9] = [
        OrderStatusType::Pending,
        OrderStatusType::Paid,
        OrderStatusType::Accepted,
        OrderStatusType::Dispatched,
        OrderStatusType::Finalized,
        OrderStatusType::Disputed,
        OrderStatusType::Settled,
        OrderStatusType::Cancelled,
        OrderStatusType::Declined,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Settled | Self::Cancelled | Self::Declined)
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
/// The delivery window of a dispatched order can be extended at most this many times
pub const MAX_EXTENDS: i64 = 2;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: UserId,
    pub vendor_id: UserId,
    pub delivery_method_id: DeliveryMethodId,
    pub status: OrderStatusType,
    /// The crypto price of the order, fixed at creation. Excludes the settlement fee.
    pub total_price: Piconero,
    pub details: String,
    pub num_extends: i64,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub price_tier_id: PriceTierId,
    /// Number of price tiers bought
    pub count: i64,
    /// Number of product units reserved from inventory, i.e. `count` times the tier size
    pub quantity: i64,
    /// Price of one tier at the time of ordering
    pub unit_price_cent: i64,
}

/// A priced order, ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: UserId,
    pub vendor_id: UserId,
    pub delivery_method_id: DeliveryMethodId,
    pub details: String,
    pub total_price: Piconero,
    pub items: Vec<NewOrderItem>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub price_tier_id: PriceTierId,
    pub count: i64,
    pub quantity: i64,
    pub unit_price_cent: i64,
}

impl From<&CartLine> for NewOrderItem {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id,
            price_tier_id: line.price_tier_id,
            count: line.count,
            quantity: line.count * line.tier_quantity,
            unit_price_cent: line.price_cent,
        }
    }
}

//--------------------------------------   Catalog snapshot   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DeliveryMethod {
    pub id: DeliveryMethodId,
    pub vendor_id: UserId,
    pub description: String,
    pub price_cent: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One line of a customer's cart, joined with the price tier it refers to.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CartLine {
    pub price_tier_id: PriceTierId,
    pub product_id: ProductId,
    pub vendor_id: UserId,
    pub count: i64,
    /// Number of product units in one tier
    pub tier_quantity: i64,
    pub price_cent: i64,
    pub tier_deleted_at: Option<DateTime<Utc>>,
}

//--------------------------------------       Invoice         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Confirmed,
    Expired,
}

status_strings!(InvoiceStatus, "invoice status", Pending, {
    Pending => "pending",
    Confirmed => "confirmed",
    Expired => "expired",
});

/// The amount the permanent deposit invoice of every wallet expects. It is unreachable, so deposit invoices are never
/// confirmed.
pub const PERMANENT_INVOICE_AMOUNT: Piconero = Piconero::new(i64::MAX >> 1);

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// The payment address assigned by the provider. `None` until the prepare-invoice job has run.
    pub address: Option<String>,
    pub amount_expected: Piconero,
    pub amount_unlocked: Piconero,
    pub status: InvoiceStatus,
    pub permanent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn is_paid(&self) -> bool {
        self.amount_unlocked >= self.amount_expected
    }
}

//--------------------------------------   Wallet & Deposit    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Piconero,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Deposit {
    pub id: DepositId,
    pub wallet_id: WalletId,
    pub invoice_id: InvoiceId,
    pub amount_deposited: Piconero,
}

/// A deposit joined with its wallet owner and invoice progress
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DepositProgress {
    pub deposit_id: DepositId,
    pub user_id: UserId,
    pub amount_deposited: Piconero,
    pub amount_unlocked: Piconero,
}

impl DepositProgress {
    /// The funds that have unlocked on the deposit invoice but have not been credited to the wallet yet
    pub fn outstanding(&self) -> Piconero {
        self.amount_unlocked - self.amount_deposited
    }
}

//--------------------------------------  Withdrawals & Txs   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
}

status_strings!(WithdrawalStatus, "withdrawal status", Pending, {
    Pending => "pending",
    Processing => "processing",
});

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub wallet_id: WalletId,
    pub destination_address: String,
    /// The amount that will be sent, i.e. net of the withdrawal fee
    pub amount: Piconero,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
}

/// An outbound transfer that has been handed to the provider and is waiting for confirmations
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------       Disputes        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DisputeOfferStatus {
    Pending,
    Accepted,
    Declined,
    /// Imposed by an administrator
    Forced,
}

status_strings!(DisputeOfferStatus, "dispute offer status", Pending, {
    Pending => "pending",
    Accepted => "accepted",
    Declined => "declined",
    Forced => "forced",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeOffer {
    pub id: DisputeOfferId,
    pub order_id: OrderId,
    /// The share of the order total returned to the customer, in [0, 1]
    pub refund_factor: Decimal,
    pub status: DisputeOfferStatus,
    pub created_at: DateTime<Utc>,
}

// The refund factor is stored as text to keep it exact, so the row mapping is done by hand.
impl FromRow<'_, SqliteRow> for DisputeOffer {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let factor: String = row.try_get("refund_factor")?;
        let refund_factor = factor.parse::<Decimal>().map_err(|e| sqlx::Error::ColumnDecode {
            index: "refund_factor".into(),
            source: Box::new(e),
        })?;
        Ok(Self {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            refund_factor,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// How the escrowed total of a disputed order was divided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundSplit {
    pub customer_refund: Piconero,
    pub vendor_refund: Piconero,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub order: Order,
    pub offer: DisputeOffer,
    pub split: RefundSplit,
}

//--------------------------------------        Reviews        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub order_id: OrderId,
    pub grade: i64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ProductReview {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub grade: i64,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReview {
    pub order_id: OrderId,
    pub grade: i64,
    pub comment: String,
    pub product_reviews: Vec<NewProductReview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProductReview {
    pub product_id: ProductId,
    pub grade: i64,
    pub comment: String,
}

pub const MAX_REVIEW_GRADE: i64 = 5;
pub const MIN_REVIEW_GRADE: i64 = 1;

//--------------------------------------         Jobs          ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Available,
    Running,
    Completed,
    Discarded,
}

status_strings!(JobStatus, "job status", Available, {
    Available => "available",
    Running => "running",
    Completed => "completed",
    Discarded => "discarded",
});

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: String,
    pub payload: String,
    pub status: JobStatus,
    pub attempts: i64,
    pub max_attempts: i64,
    pub run_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub kind: String,
    pub payload: String,
    pub max_attempts: i64,
    pub run_at: DateTime<Utc>,
}

pub const PREPARE_INVOICE_JOB: &str = "prepare_invoice";
pub const DEFAULT_MAX_ATTEMPTS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareInvoicePayload {
    pub invoice_id: InvoiceId,
}

impl NewJob {
    /// The job that asks the payment provider for an address for the given invoice, due immediately
    pub fn prepare_invoice(invoice_id: InvoiceId, now: DateTime<Utc>) -> Self {
        let payload = serde_json::json!({ "invoice_id": invoice_id }).to_string();
        Self { kind: PREPARE_INVOICE_JOB.to_string(), payload, max_attempts: DEFAULT_MAX_ATTEMPTS, run_at: now }
    }
}

//--------------------------------------    Exchange rates     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub currency: String,
    /// Price of one whole XMR in the fiat currency
    pub price: f64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_text_round_trip() {
        for s in OrderStatusType::ALL {
            assert_eq!(s.to_string().parse::<OrderStatusType>().unwrap(), s);
        }
        assert!("Paid".parse::<OrderStatusType>().is_err());
        assert_eq!(OrderStatusType::from("bogus".to_string()), OrderStatusType::Pending);
        assert_eq!("forced".parse::<DisputeOfferStatus>().unwrap(), DisputeOfferStatus::Forced);
    }

    #[test]
    fn terminal_states() {
        let terminal = OrderStatusType::ALL.iter().filter(|s| s.is_terminal()).count();
        assert_eq!(terminal, 4);
        assert!(!OrderStatusType::Disputed.is_terminal());
    }

    #[test]
    fn deposit_outstanding() {
        let p = DepositProgress {
            deposit_id: DepositId(1),
            user_id: UserId(1),
            amount_deposited: Piconero::from(300),
            amount_unlocked: Piconero::from(1000),
        };
        assert_eq!(p.outstanding(), Piconero::from(700));
    }

    #[test]
    fn prepare_invoice_job_payload() {
        let job = NewJob::prepare_invoice(InvoiceId(42), Utc::now());
        assert_eq!(job.kind, "prepare_invoice");
        assert_eq!(job.payload, r#"{"invoice_id":42}"#);
        let payload: PrepareInvoicePayload = serde_json::from_str(&job.payload).unwrap();
        assert_eq!(payload.invoice_id, InvoiceId(42));
    }

    #[test]
    fn ids_display() {
        assert_eq!(OrderId(12).to_string(), "#12");
        assert_eq!(InvoiceId::from(3).value(), 3);
    }
}
