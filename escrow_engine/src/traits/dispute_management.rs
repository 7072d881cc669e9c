use rust_decimal::Decimal;
use thiserror::Error;

use crate::db_types::{DisputeOffer, DisputeOfferId, DisputeOfferStatus, OrderId, OrderStatusType, Settlement, UserId};

#[derive(Debug, Clone, Error)]
pub enum DisputeError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} is {1}, not disputed")]
    InvalidStatus(OrderId, OrderStatusType),
    #[error("Refund factors must lie between 0 and 1, but got {0}")]
    InvalidRefundFactor(Decimal),
    #[error("Dispute offer {0} does not exist")]
    OfferNotFound(DisputeOfferId),
    #[error("Dispute offer {0} is {1}, not pending")]
    OfferNotPending(DisputeOfferId, DisputeOfferStatus),
    #[error("User {0} does not have a wallet")]
    WalletNotFound(UserId),
}

impl From<sqlx::Error> for DisputeError {
    fn from(e: sqlx::Error) -> Self {
        DisputeError::DatabaseError(e.to_string())
    }
}

/// Storage behaviour for dispute resolution.
///
/// Settling a dispute moves the order `disputed -> settled` and credits the refund shares in the same transaction as
/// the offer status change. A share is only credited if it is strictly positive.
#[allow(async_fn_in_trait)]
pub trait DisputeManagement {
    /// Records a pending offer. The order must be disputed.
    async fn insert_dispute_offer(&self, order_id: OrderId, refund_factor: Decimal)
        -> Result<DisputeOffer, DisputeError>;

    async fn fetch_dispute_offer(&self, id: DisputeOfferId) -> Result<Option<DisputeOffer>, DisputeError>;

    /// Offers for an order, newest first
    async fn fetch_dispute_offers(&self, order_id: OrderId) -> Result<Vec<DisputeOffer>, DisputeError>;

    /// `pending -> accepted` for the offer, then settles the order using the offer's refund factor
    async fn accept_dispute_offer(&self, id: DisputeOfferId) -> Result<Settlement, DisputeError>;

    /// `pending -> declined`
    async fn decline_dispute_offer(&self, id: DisputeOfferId) -> Result<DisputeOffer, DisputeError>;

    /// Records a `forced` offer and settles the order with it
    async fn force_settlement(&self, order_id: OrderId, refund_factor: Decimal) -> Result<Settlement, DisputeError>;
}
