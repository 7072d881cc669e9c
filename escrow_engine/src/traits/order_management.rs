use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{
        CartLine,
        DeliveryMethod,
        DeliveryMethodId,
        InvoiceStatus,
        NewOrder,
        NewReview,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
        ProductId,
        Review,
        UserId,
    },
    escrow_api::order_objects::OrderQueryFilter,
    traits::{data_objects::PlacedOrder, ExchangeRateError, Funding},
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {order_id} cannot move from {current} to {target}")]
    InvalidStatus { order_id: OrderId, current: OrderStatusType, target: OrderStatusType },
    #[error("The delivery method is unavailable")]
    DeliveryMethodUnavailable,
    #[error("Customers cannot order from themselves")]
    CustomerIsVendor,
    #[error("The cart holds no items from this vendor")]
    CartIsEmpty,
    #[error("One or more items in the cart are no longer for sale at the listed price")]
    PricingUnavailable,
    #[error("The wallet balance is too low to pay for this order")]
    NotEnoughBalance,
    #[error("Product {0} does not have enough inventory to fill the order")]
    InsufficientInventory(ProductId),
    #[error("The order has already been extended the maximum number of times")]
    UnableToExtendFurther,
    #[error("The delivery window cannot be extended yet")]
    ExtendUnavailable,
    #[error("The delivery window cannot be extended a second time yet")]
    ReExtendUnavailable,
    #[error("Order {0} has already been reviewed")]
    ReviewAlreadyExists(OrderId),
    #[error("Review grades must be between 1 and 5, but got {0}")]
    InvalidReviewGrade(i64),
    #[error("User {0} does not have a wallet")]
    WalletNotFound(UserId),
    #[error("Could not price the order. {0}")]
    ExchangeRateError(#[from] ExchangeRateError),
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        OrderFlowError::DatabaseError(e.to_string())
    }
}

/// Storage backend behaviour for the order state machine.
///
/// Every method is a single atomic unit of work: a status change and all of its side effects (inventory, wallet
/// credits and refunds, reviews, invoice links) either commit together or not at all. Status changes only succeed
/// from the statuses listed in [`crate::transitions::valid_predecessors`]. Otherwise
/// [`OrderFlowError::InvalidStatus`] is returned and nothing changes.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, OrderFlowError>;

    async fn fetch_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, OrderFlowError>;

    /// Fetches orders matching the filter, ordered by `created_at` ascending
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError>;

    /// Fetches `pending` orders whose linked invoice has the given status
    async fn fetch_pending_orders_with_invoice_status(
        &self,
        status: InvoiceStatus,
    ) -> Result<Vec<Order>, OrderFlowError>;

    async fn fetch_delivery_method(&self, id: DeliveryMethodId) -> Result<Option<DeliveryMethod>, OrderFlowError>;

    /// The customer's cart lines for products sold by `vendor_id`
    async fn fetch_cart_lines(&self, customer_id: UserId, vendor_id: UserId) -> Result<Vec<CartLine>, OrderFlowError>;

    /// Persists the order and its items, clears the matching cart lines and applies the funding choice:
    /// * [`Funding::Wallet`] debits `add_fee(total)` from the customer and marks the order paid, or fails with
    ///   [`OrderFlowError::NotEnoughBalance`], leaving nothing behind.
    /// * [`Funding::Invoice`] creates an invoice for `add_fee(total)`, links it to the order and enqueues the job that
    ///   will assign it a payment address.
    async fn insert_order(&self, order: NewOrder, funding: Funding) -> Result<PlacedOrder, OrderFlowError>;

    /// `pending -> paid`
    async fn mark_order_paid(&self, order_id: OrderId) -> Result<Order, OrderFlowError>;

    /// `pending -> cancelled`
    async fn cancel_order(&self, order_id: OrderId) -> Result<Order, OrderFlowError>;

    /// `paid -> accepted`. Decrements product inventory by the ordered quantities.
    async fn accept_order(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Order, OrderFlowError>;

    /// `{paid, accepted} -> declined`. Refunds `add_fee(total)` to the customer.
    async fn decline_order(&self, order_id: OrderId) -> Result<Order, OrderFlowError>;

    /// `accepted -> dispatched`
    async fn dispatch_order(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Order, OrderFlowError>;

    /// `dispatched -> finalized`. Credits the vendor with the order total. If `default_review` is true, the order and
    /// each of its items are also given the top grade in the same transaction.
    async fn finalize_order(&self, order_id: OrderId, default_review: bool) -> Result<Order, OrderFlowError>;

    /// `dispatched -> disputed`
    async fn dispute_order(&self, order_id: OrderId) -> Result<Order, OrderFlowError>;

    /// Increments the extension counter of a dispatched order, up to the maximum.
    async fn extend_order(&self, order_id: OrderId) -> Result<Order, OrderFlowError>;

    /// Stores a customer review for a finalized order
    async fn insert_review(&self, review: NewReview) -> Result<Review, OrderFlowError>;

    async fn fetch_review(&self, order_id: OrderId) -> Result<Option<Review>, OrderFlowError>;
}
