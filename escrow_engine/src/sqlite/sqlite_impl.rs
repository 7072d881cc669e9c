//! `SqliteDatabase` is the SQLite backend of the escrow engine.
//!
//! It implements every storage trait in [`crate::traits`]. Each trait method is one unit of work: it opens a
//! transaction, composes the low-level calls from [`super::db`], and commits. Returning early with an error drops the
//! transaction, which rolls it back.
use std::{
    collections::{BTreeMap, HashMap},
    fmt::Debug,
};

use chrono::{DateTime, Duration, Utc};
use esc_common::{fees::add_fee, Currency};
use log::*;
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};

use super::db::{
    catalog,
    db_url,
    disputes,
    exchange_rates,
    invoices,
    is_check_violation,
    is_unique_violation,
    jobs,
    new_pool,
    orders,
    reviews,
    wallets,
    withdrawals,
};
use crate::{
    db_types::{
        CartLine,
        DeliveryMethod,
        DeliveryMethodId,
        DepositProgress,
        DisputeOffer,
        DisputeOfferId,
        DisputeOfferStatus,
        ExchangeRate,
        Invoice,
        InvoiceId,
        InvoiceStatus,
        Job,
        JobId,
        JobStatus,
        NewJob,
        NewOrder,
        NewProductReview,
        NewReview,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
        Piconero,
        PriceTierId,
        ProductId,
        Review,
        Settlement,
        Transaction,
        TransactionId,
        UserId,
        Wallet,
        Withdrawal,
        WithdrawalId,
        MAX_REVIEW_GRADE,
        PERMANENT_INVOICE_AMOUNT,
    },
    escrow_api::order_objects::OrderQueryFilter,
    helpers::split_refund,
    traits::{
        DisputeError,
        DisputeManagement,
        ExchangeRateError,
        ExchangeRates,
        Funding,
        InvoiceError,
        InvoiceManagement,
        JobQueue,
        JobQueueError,
        OrderFlowError,
        OrderManagement,
        PlacedOrder,
        WalletError,
        WalletManagement,
        WithdrawalError,
        WithdrawalManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database named by `ESC_DATABASE_URL`
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&mut self) -> Result<(), sqlx::Error> {
        self.pool.close().await;
        Ok(())
    }

    /// Brings the schema up to date with the migrations embedded in this crate
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }
}

//--------------------------------------   Order state machine   -------------------------------------------------------

/// Moves the order to `target`, or explains why it could not be moved.
async fn transition_order(
    id: OrderId,
    target: OrderStatusType,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderFlowError> {
    if let Some(order) = orders::update_order_status(id, target, now, &mut *conn).await? {
        debug!("🗃️ Order {id} moved to {target}");
        return Ok(order);
    }
    match orders::fetch_order(id, conn).await? {
        Some(order) => Err(OrderFlowError::InvalidStatus { order_id: id, current: order.status, target }),
        None => Err(OrderFlowError::OrderNotFound(id)),
    }
}

async fn credit_wallet(user_id: UserId, amount: Piconero, conn: &mut SqliteConnection) -> Result<(), OrderFlowError> {
    wallets::add_balance(user_id, amount, conn).await?.ok_or(OrderFlowError::WalletNotFound(user_id))?;
    Ok(())
}

/// The top grade for the order and for every distinct product in it
fn top_grade_review(order_id: OrderId, items: &[OrderItem]) -> NewReview {
    let mut product_reviews: Vec<NewProductReview> = Vec::with_capacity(items.len());
    for item in items {
        if product_reviews.iter().all(|r| r.product_id != item.product_id) {
            product_reviews.push(NewProductReview {
                product_id: item.product_id,
                grade: MAX_REVIEW_GRADE,
                comment: String::new(),
            });
        }
    }
    NewReview { order_id, grade: MAX_REVIEW_GRADE, comment: String::new(), product_reviews }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_order_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_pending_orders_with_invoice_status(
        &self,
        status: InvoiceStatus,
    ) -> Result<Vec<Order>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_pending_orders_with_invoice_status(status, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_delivery_method(&self, id: DeliveryMethodId) -> Result<Option<DeliveryMethod>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let dm = catalog::fetch_delivery_method(id, &mut conn).await?;
        Ok(dm)
    }

    async fn fetch_cart_lines(&self, customer_id: UserId, vendor_id: UserId) -> Result<Vec<CartLine>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let lines = catalog::fetch_cart_lines(customer_id, vendor_id, &mut conn).await?;
        Ok(lines)
    }

    async fn insert_order(&self, order: NewOrder, funding: Funding) -> Result<PlacedOrder, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let now = order.created_at;
        let record = orders::insert_order(&order, &mut tx).await?;
        let tiers = order.items.iter().map(|i| i.price_tier_id).collect::<Vec<PriceTierId>>();
        catalog::clear_cart_lines(order.customer_id, &tiers, &mut tx).await?;
        let due = add_fee(record.total_price);
        let placed = match funding {
            Funding::Wallet => {
                if wallets::reduce_balance(order.customer_id, due, &mut tx).await?.is_none() {
                    return match wallets::fetch_wallet_for_user(order.customer_id, &mut tx).await? {
                        Some(w) => {
                            debug!("🗃️ Wallet of user {} holds {}, but order needs {due}", w.user_id, w.balance);
                            Err(OrderFlowError::NotEnoughBalance)
                        },
                        None => Err(OrderFlowError::WalletNotFound(order.customer_id)),
                    };
                }
                let paid = transition_order(record.id, OrderStatusType::Paid, now, &mut tx).await?;
                PlacedOrder { order: paid, invoice: None }
            },
            Funding::Invoice => {
                let invoice = invoices::insert_invoice(due, false, now, &mut tx).await?;
                orders::link_invoice(record.id, invoice.id, &mut tx).await?;
                jobs::enqueue(&NewJob::prepare_invoice(invoice.id, now), now, &mut tx).await?;
                PlacedOrder { order: record, invoice: Some(invoice) }
            },
        };
        tx.commit().await?;
        debug!("🗃️ Order {} placed with {funding:?} funding", placed.order.id);
        Ok(placed)
    }

    async fn mark_order_paid(&self, order_id: OrderId) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        transition_order(order_id, OrderStatusType::Paid, Utc::now(), &mut conn).await
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        transition_order(order_id, OrderStatusType::Cancelled, Utc::now(), &mut conn).await
    }

    async fn accept_order(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = transition_order(order_id, OrderStatusType::Accepted, now, &mut tx).await?;
        let items = orders::fetch_order_items(order_id, &mut tx).await?;
        let mut per_product = BTreeMap::<ProductId, i64>::new();
        for item in &items {
            *per_product.entry(item.product_id).or_default() += item.quantity;
        }
        for (product_id, quantity) in per_product {
            catalog::decrement_inventory(product_id, quantity, &mut tx).await.map_err(|e| {
                if is_check_violation(&e) {
                    OrderFlowError::InsufficientInventory(product_id)
                } else {
                    OrderFlowError::from(e)
                }
            })?;
        }
        tx.commit().await?;
        Ok(order)
    }

    async fn decline_order(&self, order_id: OrderId) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = transition_order(order_id, OrderStatusType::Declined, Utc::now(), &mut tx).await?;
        let refund = add_fee(order.total_price);
        credit_wallet(order.customer_id, refund, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} declined. {refund} refunded to user {}", order.customer_id);
        Ok(order)
    }

    async fn dispatch_order(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        transition_order(order_id, OrderStatusType::Dispatched, now, &mut conn).await
    }

    async fn finalize_order(&self, order_id: OrderId, default_review: bool) -> Result<Order, OrderFlowError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let order = transition_order(order_id, OrderStatusType::Finalized, now, &mut tx).await?;
        credit_wallet(order.vendor_id, order.total_price, &mut tx).await?;
        if default_review {
            let items = orders::fetch_order_items(order_id, &mut tx).await?;
            let review = top_grade_review(order_id, &items);
            reviews::insert_review(&review, now, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Order {order_id} finalized. {} credited to vendor {}", order.total_price, order.vendor_id);
        Ok(order)
    }

    async fn dispute_order(&self, order_id: OrderId) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        transition_order(order_id, OrderStatusType::Disputed, Utc::now(), &mut conn).await
    }

    async fn extend_order(&self, order_id: OrderId) -> Result<Order, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(order) = orders::increment_extends(order_id, Utc::now(), &mut conn).await? {
            return Ok(order);
        }
        match orders::fetch_order(order_id, &mut conn).await? {
            None => Err(OrderFlowError::OrderNotFound(order_id)),
            Some(o) if o.status != OrderStatusType::Dispatched => Err(OrderFlowError::InvalidStatus {
                order_id,
                current: o.status,
                target: OrderStatusType::Dispatched,
            }),
            Some(_) => Err(OrderFlowError::UnableToExtendFurther),
        }
    }

    async fn insert_review(&self, review: NewReview) -> Result<Review, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order =
            orders::fetch_order(review.order_id, &mut tx).await?.ok_or(OrderFlowError::OrderNotFound(review.order_id))?;
        if order.status != OrderStatusType::Finalized {
            return Err(OrderFlowError::InvalidStatus {
                order_id: order.id,
                current: order.status,
                target: OrderStatusType::Finalized,
            });
        }
        let record = reviews::insert_review(&review, Utc::now(), &mut tx).await.map_err(|e| {
            if is_unique_violation(&e) {
                OrderFlowError::ReviewAlreadyExists(review.order_id)
            } else {
                OrderFlowError::from(e)
            }
        })?;
        tx.commit().await?;
        Ok(record)
    }

    async fn fetch_review(&self, order_id: OrderId) -> Result<Option<Review>, OrderFlowError> {
        let mut conn = self.pool.acquire().await?;
        let review = reviews::fetch_review(order_id, &mut conn).await?;
        Ok(review)
    }
}

//--------------------------------------         Wallets         -------------------------------------------------------

impl WalletManagement for SqliteDatabase {
    async fn create_wallet(&self, user_id: UserId) -> Result<Wallet, WalletError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let wallet = wallets::insert_wallet(user_id, now, &mut tx).await.map_err(|e| {
            if is_unique_violation(&e) {
                WalletError::WalletAlreadyExists(user_id)
            } else {
                WalletError::from(e)
            }
        })?;
        let invoice = invoices::insert_invoice(PERMANENT_INVOICE_AMOUNT, true, now, &mut tx).await?;
        wallets::insert_deposit(wallet.id, invoice.id, &mut tx).await?;
        jobs::enqueue(&NewJob::prepare_invoice(invoice.id, now), now, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Wallet {} created for user {user_id} with deposit invoice {}", wallet.id, invoice.id);
        Ok(wallet)
    }

    async fn fetch_wallet_for_user(&self, user_id: UserId) -> Result<Option<Wallet>, WalletError> {
        let mut conn = self.pool.acquire().await?;
        let wallet = wallets::fetch_wallet_for_user(user_id, &mut conn).await?;
        Ok(wallet)
    }

    async fn add_balance(&self, user_id: UserId, amount: Piconero) -> Result<Wallet, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(amount));
        }
        let mut conn = self.pool.acquire().await?;
        wallets::add_balance(user_id, amount, &mut conn).await?.ok_or(WalletError::WalletNotFound(user_id))
    }

    async fn reduce_balance(&self, user_id: UserId, amount: Piconero) -> Result<Wallet, WalletError> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(amount));
        }
        let mut conn = self.pool.acquire().await?;
        if let Some(wallet) = wallets::reduce_balance(user_id, amount, &mut conn).await? {
            return Ok(wallet);
        }
        match wallets::fetch_wallet_for_user(user_id, &mut conn).await? {
            Some(w) => Err(WalletError::InsufficientBalance { user_id, balance: w.balance, requested: amount }),
            None => Err(WalletError::WalletNotFound(user_id)),
        }
    }

    async fn deposit_address(&self, user_id: UserId) -> Result<Option<String>, WalletError> {
        let mut conn = self.pool.acquire().await?;
        let address = wallets::deposit_address(user_id, &mut conn).await?;
        Ok(address)
    }
}

//--------------------------------------   Invoices & deposits   -------------------------------------------------------

impl InvoiceManagement for SqliteDatabase {
    async fn create_invoice(&self, amount: Piconero) -> Result<Invoice, InvoiceError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let invoice = invoices::insert_invoice(amount, false, now, &mut tx).await?;
        jobs::enqueue(&NewJob::prepare_invoice(invoice.id, now), now, &mut tx).await?;
        tx.commit().await?;
        Ok(invoice)
    }

    async fn fetch_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, InvoiceError> {
        let mut conn = self.pool.acquire().await?;
        let invoice = invoices::fetch_invoice(id, &mut conn).await?;
        Ok(invoice)
    }

    async fn fetch_invoice_for_order(&self, order_id: OrderId) -> Result<Option<Invoice>, InvoiceError> {
        let mut conn = self.pool.acquire().await?;
        let invoice = invoices::fetch_invoice_for_order(order_id, &mut conn).await?;
        Ok(invoice)
    }

    async fn attach_invoice_address(&self, id: InvoiceId, address: &str) -> Result<Invoice, InvoiceError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(invoice) = invoices::attach_address(id, address, Utc::now(), &mut conn).await? {
            debug!("🗃️ Invoice {id} can now be paid at {address}");
            return Ok(invoice);
        }
        match invoices::fetch_invoice(id, &mut conn).await? {
            Some(invoice) if invoice.address.is_some() => Err(InvoiceError::InvoiceAlreadyPrepared(id)),
            Some(invoice) => Err(InvoiceError::InvoiceNotPending(id, invoice.status)),
            None => Err(InvoiceError::InvoiceNotFound(id)),
        }
    }

    async fn fetch_pending_invoices(&self) -> Result<Vec<Invoice>, InvoiceError> {
        let mut conn = self.pool.acquire().await?;
        let invoices = invoices::fetch_pending_invoices(&mut conn).await?;
        Ok(invoices)
    }

    async fn update_invoice_progress(
        &self,
        id: InvoiceId,
        amount_unlocked: Piconero,
        status: Option<InvoiceStatus>,
    ) -> Result<Invoice, InvoiceError> {
        let mut tx = self.pool.begin().await?;
        let invoice = invoices::update_progress(id, amount_unlocked, status, Utc::now(), &mut tx)
            .await?
            .ok_or(InvoiceError::InvoiceNotFound(id))?;
        tx.commit().await?;
        Ok(invoice)
    }

    async fn fetch_deposit_progress(&self) -> Result<Vec<DepositProgress>, InvoiceError> {
        let mut conn = self.pool.acquire().await?;
        let deposits = wallets::fetch_deposit_progress(&mut conn).await?;
        Ok(deposits)
    }

    async fn credit_deposit(&self, progress: &DepositProgress) -> Result<Piconero, InvoiceError> {
        let outstanding = progress.outstanding();
        if !outstanding.is_positive() {
            return Ok(Piconero::default());
        }
        let mut tx = self.pool.begin().await?;
        if !wallets::advance_deposit(progress, progress.amount_unlocked, &mut tx).await? {
            debug!("🗃️ Deposit {} was credited by someone else in the meantime", progress.deposit_id);
            return Ok(Piconero::default());
        }
        if wallets::add_balance(progress.user_id, outstanding, &mut tx).await?.is_none() {
            return Err(InvoiceError::DatabaseError(format!(
                "Deposit {} belongs to user {}, who has no wallet",
                progress.deposit_id, progress.user_id
            )));
        }
        tx.commit().await?;
        Ok(outstanding)
    }
}

//--------------------------------------       Withdrawals       -------------------------------------------------------

impl WithdrawalManagement for SqliteDatabase {
    async fn create_withdrawal(
        &self,
        user_id: UserId,
        destination: &str,
        amount: Piconero,
        fee: Piconero,
    ) -> Result<Withdrawal, WithdrawalError> {
        let mut tx = self.pool.begin().await?;
        let wallet = match wallets::reduce_balance(user_id, amount, &mut tx).await? {
            Some(w) => w,
            None => {
                return match wallets::fetch_wallet_for_user(user_id, &mut tx).await? {
                    Some(_) => Err(WithdrawalError::NotEnoughBalanceToWithdraw),
                    None => Err(WithdrawalError::WalletNotFound(user_id)),
                };
            },
        };
        let net = amount - fee;
        let withdrawal = withdrawals::insert_withdrawal(wallet.id, destination, net, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(withdrawal)
    }

    async fn fetch_withdrawals_for_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>, WithdrawalError> {
        let mut conn = self.pool.acquire().await?;
        let result = withdrawals::fetch_withdrawals_for_user(user_id, &mut conn).await?;
        Ok(result)
    }

    async fn claim_pending_withdrawals(&self) -> Result<Vec<Withdrawal>, WithdrawalError> {
        let mut tx = self.pool.begin().await?;
        let claimed = withdrawals::claim_pending(&mut tx).await?;
        tx.commit().await?;
        Ok(claimed)
    }

    async fn release_withdrawals(&self, ids: &[WithdrawalId]) -> Result<u64, WithdrawalError> {
        let mut tx = self.pool.begin().await?;
        let released = withdrawals::release(ids, &mut tx).await?;
        tx.commit().await?;
        Ok(released)
    }

    async fn complete_withdrawals(
        &self,
        ids: &[WithdrawalId],
        tx_hashes: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, WithdrawalError> {
        let mut tx = self.pool.begin().await?;
        let deleted = withdrawals::delete_withdrawals(ids, &mut tx).await?;
        let mut transactions = Vec::with_capacity(tx_hashes.len());
        for hash in tx_hashes {
            transactions.push(withdrawals::insert_transaction(hash, now, &mut tx).await?);
        }
        tx.commit().await?;
        debug!("🗃️ {deleted} withdrawals handed over in {} transactions", transactions.len());
        Ok(transactions)
    }

    async fn fetch_transactions(&self) -> Result<Vec<Transaction>, WithdrawalError> {
        let mut conn = self.pool.acquire().await?;
        let txs = withdrawals::fetch_transactions(&mut conn).await?;
        Ok(txs)
    }

    async fn delete_transaction(&self, id: TransactionId) -> Result<(), WithdrawalError> {
        let mut conn = self.pool.acquire().await?;
        withdrawals::delete_transaction(id, &mut conn).await?;
        Ok(())
    }
}

//--------------------------------------        Disputes         -------------------------------------------------------

/// `disputed -> settled`, and pays out both shares of the order total according to the offer
async fn settle(offer: DisputeOffer, conn: &mut SqliteConnection) -> Result<Settlement, DisputeError> {
    let order_id = offer.order_id;
    let order = match orders::update_order_status(order_id, OrderStatusType::Settled, Utc::now(), &mut *conn).await? {
        Some(o) => o,
        None => {
            return match orders::fetch_order(order_id, &mut *conn).await? {
                Some(o) => Err(DisputeError::InvalidStatus(order_id, o.status)),
                None => Err(DisputeError::OrderNotFound(order_id)),
            };
        },
    };
    let split = split_refund(order.total_price, offer.refund_factor)
        .ok_or(DisputeError::InvalidRefundFactor(offer.refund_factor))?;
    if split.customer_refund.is_positive() {
        wallets::add_balance(order.customer_id, split.customer_refund, &mut *conn)
            .await?
            .ok_or(DisputeError::WalletNotFound(order.customer_id))?;
    }
    if split.vendor_refund.is_positive() {
        wallets::add_balance(order.vendor_id, split.vendor_refund, &mut *conn)
            .await?
            .ok_or(DisputeError::WalletNotFound(order.vendor_id))?;
    }
    info!(
        "🗃️ Dispute on order {order_id} settled. Customer receives {}, vendor receives {}",
        split.customer_refund, split.vendor_refund
    );
    Ok(Settlement { order, offer, split })
}

async fn resolve_offer(
    id: DisputeOfferId,
    status: DisputeOfferStatus,
    conn: &mut SqliteConnection,
) -> Result<DisputeOffer, DisputeError> {
    if let Some(offer) = disputes::resolve_offer(id, status, &mut *conn).await? {
        return Ok(offer);
    }
    match disputes::fetch_offer(id, conn).await? {
        Some(offer) => Err(DisputeError::OfferNotPending(id, offer.status)),
        None => Err(DisputeError::OfferNotFound(id)),
    }
}

async fn require_disputed(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Order, DisputeError> {
    let order = orders::fetch_order(order_id, conn).await?.ok_or(DisputeError::OrderNotFound(order_id))?;
    if order.status != OrderStatusType::Disputed {
        return Err(DisputeError::InvalidStatus(order_id, order.status));
    }
    Ok(order)
}

fn check_factor(refund_factor: Decimal) -> Result<(), DisputeError> {
    if crate::helpers::is_valid_refund_factor(refund_factor) {
        Ok(())
    } else {
        Err(DisputeError::InvalidRefundFactor(refund_factor))
    }
}

impl DisputeManagement for SqliteDatabase {
    async fn insert_dispute_offer(
        &self,
        order_id: OrderId,
        refund_factor: Decimal,
    ) -> Result<DisputeOffer, DisputeError> {
        check_factor(refund_factor)?;
        let mut tx = self.pool.begin().await?;
        require_disputed(order_id, &mut tx).await?;
        let offer =
            disputes::insert_offer(order_id, refund_factor, DisputeOfferStatus::Pending, Utc::now(), &mut tx).await?;
        tx.commit().await?;
        Ok(offer)
    }

    async fn fetch_dispute_offer(&self, id: DisputeOfferId) -> Result<Option<DisputeOffer>, DisputeError> {
        let mut conn = self.pool.acquire().await?;
        let offer = disputes::fetch_offer(id, &mut conn).await?;
        Ok(offer)
    }

    async fn fetch_dispute_offers(&self, order_id: OrderId) -> Result<Vec<DisputeOffer>, DisputeError> {
        let mut conn = self.pool.acquire().await?;
        let offers = disputes::fetch_offers_for_order(order_id, &mut conn).await?;
        Ok(offers)
    }

    async fn accept_dispute_offer(&self, id: DisputeOfferId) -> Result<Settlement, DisputeError> {
        let mut tx = self.pool.begin().await?;
        let offer = resolve_offer(id, DisputeOfferStatus::Accepted, &mut tx).await?;
        let settlement = settle(offer, &mut tx).await?;
        tx.commit().await?;
        Ok(settlement)
    }

    async fn decline_dispute_offer(&self, id: DisputeOfferId) -> Result<DisputeOffer, DisputeError> {
        let mut tx = self.pool.begin().await?;
        let offer = resolve_offer(id, DisputeOfferStatus::Declined, &mut tx).await?;
        tx.commit().await?;
        Ok(offer)
    }

    async fn force_settlement(&self, order_id: OrderId, refund_factor: Decimal) -> Result<Settlement, DisputeError> {
        check_factor(refund_factor)?;
        let mut tx = self.pool.begin().await?;
        require_disputed(order_id, &mut tx).await?;
        let offer =
            disputes::insert_offer(order_id, refund_factor, DisputeOfferStatus::Forced, Utc::now(), &mut tx).await?;
        let settlement = settle(offer, &mut tx).await?;
        tx.commit().await?;
        Ok(settlement)
    }
}

//--------------------------------------     Exchange rates      -------------------------------------------------------

impl ExchangeRates for SqliteDatabase {
    async fn fetch_latest_rates(&self) -> Result<Vec<ExchangeRate>, ExchangeRateError> {
        let mut conn = self.pool.acquire().await?;
        let rates = exchange_rates::fetch_latest_rates(&mut conn).await?;
        Ok(rates)
    }

    async fn fetch_last_rate(&self, currency: Currency) -> Result<ExchangeRate, ExchangeRateError> {
        let mut conn = self.pool.acquire().await?;
        exchange_rates::fetch_last_rate(currency.code(), &mut conn)
            .await?
            .ok_or_else(|| ExchangeRateError::RateDoesNotExist(currency.code().to_string()))
    }

    async fn set_prices(&self, prices: &HashMap<Currency, f64>) -> Result<(), ExchangeRateError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for (currency, price) in prices {
            exchange_rates::insert_rate(currency.code(), *price, now, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Stored {} exchange rates", prices.len());
        Ok(())
    }
}

//--------------------------------------        Job queue        -------------------------------------------------------

impl JobQueue for SqliteDatabase {
    async fn enqueue_job(&self, job: NewJob) -> Result<Job, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        let job = jobs::enqueue(&job, Utc::now(), &mut conn).await?;
        Ok(job)
    }

    async fn claim_jobs(
        &self,
        kind: &str,
        limit: i64,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Vec<Job>, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        let claimed = jobs::claim(kind, limit, now, lease, &mut conn).await?;
        Ok(claimed)
    }

    async fn complete_job(&self, id: JobId) -> Result<Job, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        jobs::complete(id, &mut conn).await?.ok_or(JobQueueError::JobNotFound(id))
    }

    async fn fail_job(&self, id: JobId, error: &str, retry_at: DateTime<Utc>) -> Result<JobStatus, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        let job = jobs::fail(id, error, retry_at, &mut conn).await?.ok_or(JobQueueError::JobNotFound(id))?;
        Ok(job.status)
    }

    async fn fetch_job(&self, id: JobId) -> Result<Option<Job>, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        let job = jobs::fetch(id, &mut conn).await?;
        Ok(job)
    }
}
