use std::fmt::Debug;

use chrono::{DateTime, Utc};
use esc_common::DEFAULT_CURRENCY;
use log::*;

use crate::{
    db_types::{
        DeliveryMethodId,
        InvoiceStatus,
        NewOrder,
        NewOrderItem,
        NewReview,
        Order,
        OrderId,
        OrderStatusType,
        Review,
        UserId,
        MAX_EXTENDS,
        MAX_REVIEW_GRADE,
        MIN_REVIEW_GRADE,
    },
    escrow_api::{
        order_objects::{OrderParties, OrderQueryFilter, OrderWindows},
        price_table::PriceTable,
    },
    events::{EventProducers, OrderStatusChangedEvent},
    traits::{Funding, JobReport, OrderFlowError, OrderManagement, PlacedOrder},
};

/// `OrderFlowApi` drives orders through their life cycle: checkout, the vendor and customer actions, and the periodic
/// jobs that move orders along when nobody acts in time.
pub struct OrderFlowApi<B> {
    db: B,
    prices: PriceTable,
    windows: OrderWindows,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({:?})", self.windows)
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, prices: PriceTable, windows: OrderWindows, producers: EventProducers) -> Self {
        Self { db, prices, windows, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn windows(&self) -> &OrderWindows {
        &self.windows
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    /// Checks whether the delivery window of `order` may be extended at `now`.
    pub fn extend_available(&self, order: &Order, now: DateTime<Utc>) -> Result<(), OrderFlowError> {
        if order.status != OrderStatusType::Dispatched {
            return Err(OrderFlowError::InvalidStatus {
                order_id: order.id,
                current: order.status,
                target: OrderStatusType::Dispatched,
            });
        }
        if order.num_extends >= MAX_EXTENDS {
            return Err(OrderFlowError::UnableToExtendFurther);
        }
        let dispatched_at = order.dispatched_at.unwrap_or(order.updated_at);
        let since_dispatch = now - dispatched_at;
        match order.num_extends {
            0 if since_dispatch < self.windows.extend_unavailable => Err(OrderFlowError::ExtendUnavailable),
            1 if since_dispatch < self.windows.extend_unavailable + self.windows.delivery => {
                Err(OrderFlowError::ReExtendUnavailable)
            },
            _ => Ok(()),
        }
    }

    async fn notify(&self, order: &Order, previous: Option<OrderStatusType>) {
        self.producers.order_status_changed(OrderStatusChangedEvent::new(order.clone(), previous)).await;
    }
}

impl<B> OrderFlowApi<B>
where B: OrderManagement
{
    /// Prices the customer's cart for the vendor of the delivery method and builds the order, without storing it.
    ///
    /// The fiat total is the delivery price plus the price of every cart line, converted to XMR at the current price
    /// table rate.
    pub async fn prepare_order(
        &self,
        customer_id: UserId,
        delivery_method_id: DeliveryMethodId,
        details: &str,
    ) -> Result<NewOrder, OrderFlowError> {
        let dm = self
            .db
            .fetch_delivery_method(delivery_method_id)
            .await?
            .filter(|dm| dm.deleted_at.is_none())
            .ok_or(OrderFlowError::DeliveryMethodUnavailable)?;
        if dm.vendor_id == customer_id {
            return Err(OrderFlowError::CustomerIsVendor);
        }
        let lines = self.db.fetch_cart_lines(customer_id, dm.vendor_id).await?;
        if lines.is_empty() {
            return Err(OrderFlowError::CartIsEmpty);
        }
        if lines.iter().any(|l| l.tier_deleted_at.is_some()) {
            return Err(OrderFlowError::PricingUnavailable);
        }
        let cents = dm.price_cent + lines.iter().map(|l| l.price_cent * l.count).sum::<i64>();
        let total_price = self.prices.fiat_to_crypto(DEFAULT_CURRENCY, cents)?;
        trace!("🔄️ Cart of user {customer_id} comes to {cents}c {DEFAULT_CURRENCY}, or {total_price}");
        Ok(NewOrder {
            customer_id,
            vendor_id: dm.vendor_id,
            delivery_method_id,
            details: details.to_string(),
            total_price,
            items: lines.iter().map(NewOrderItem::from).collect(),
            created_at: Utc::now(),
        })
    }

    /// Checks out the customer's cart for one vendor and funds the new order.
    ///
    /// See [`OrderManagement::insert_order`] for what each [`Funding`] choice does.
    pub async fn place_order(
        &self,
        customer_id: UserId,
        delivery_method_id: DeliveryMethodId,
        details: &str,
        funding: Funding,
    ) -> Result<PlacedOrder, OrderFlowError> {
        let order = self.prepare_order(customer_id, delivery_method_id, details).await?;
        let placed = self.db.insert_order(order, funding).await?;
        info!("🔄️ Order {} placed by user {customer_id}. Status: {}", placed.order.id, placed.order.status);
        self.notify(&placed.order, None).await;
        Ok(placed)
    }

    pub async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>, OrderFlowError> {
        self.db.fetch_order(order_id).await
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderFlowError> {
        self.db.search_orders(query).await
    }

    pub async fn mark_paid(&self, order_id: OrderId) -> Result<Order, OrderFlowError> {
        let order = self.db.mark_order_paid(order_id).await?;
        debug!("🔄️ Order {order_id} is paid");
        self.notify(&order, Some(OrderStatusType::Pending)).await;
        Ok(order)
    }

    pub async fn cancel(&self, order_id: OrderId) -> Result<Order, OrderFlowError> {
        let order = self.db.cancel_order(order_id).await?;
        debug!("🔄️ Order {order_id} cancelled");
        self.notify(&order, Some(OrderStatusType::Pending)).await;
        Ok(order)
    }

    pub async fn accept(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Order, OrderFlowError> {
        let order = self.db.accept_order(order_id, now).await?;
        debug!("🔄️ Order {order_id} accepted by vendor {}", order.vendor_id);
        self.notify(&order, Some(OrderStatusType::Paid)).await;
        Ok(order)
    }

    pub async fn decline(&self, order_id: OrderId) -> Result<Order, OrderFlowError> {
        let order = self.db.decline_order(order_id).await?;
        let previous = if order.accepted_at.is_some() { OrderStatusType::Accepted } else { OrderStatusType::Paid };
        debug!("🔄️ Order {order_id} declined while {previous}");
        self.notify(&order, Some(previous)).await;
        Ok(order)
    }

    pub async fn dispatch(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Order, OrderFlowError> {
        let order = self.db.dispatch_order(order_id, now).await?;
        debug!("🔄️ Order {order_id} dispatched");
        self.notify(&order, Some(OrderStatusType::Accepted)).await;
        Ok(order)
    }

    /// Releases the escrowed total to the vendor. Called by the customer on receipt of the goods.
    pub async fn finalize(&self, order_id: OrderId) -> Result<Order, OrderFlowError> {
        let order = self.db.finalize_order(order_id, false).await?;
        debug!("🔄️ Order {order_id} finalized");
        self.notify(&order, Some(OrderStatusType::Dispatched)).await;
        Ok(order)
    }

    /// Pushes the automatic finalization of a dispatched order back by one delivery window
    pub async fn extend(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Order, OrderFlowError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(OrderFlowError::OrderNotFound(order_id))?;
        self.extend_available(&order, now)?;
        let order = self.db.extend_order(order_id).await?;
        debug!("🔄️ Delivery window of order {order_id} extended ({} of {MAX_EXTENDS})", order.num_extends);
        Ok(order)
    }

    pub async fn create_review(&self, review: NewReview) -> Result<Review, OrderFlowError> {
        let grades = std::iter::once(review.grade).chain(review.product_reviews.iter().map(|r| r.grade));
        for grade in grades {
            if !(MIN_REVIEW_GRADE..=MAX_REVIEW_GRADE).contains(&grade) {
                return Err(OrderFlowError::InvalidReviewGrade(grade));
            }
        }
        self.db.insert_review(review).await
    }

    pub async fn fetch_review(&self, order_id: OrderId) -> Result<Option<Review>, OrderFlowError> {
        self.db.fetch_review(order_id).await
    }

    async fn parties(&self, order_id: OrderId) -> Result<OrderParties, OrderFlowError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(OrderFlowError::OrderNotFound(order_id))?;
        Ok(OrderParties::from(&order))
    }

    pub async fn is_customer(&self, user_id: UserId, order_id: OrderId) -> Result<bool, OrderFlowError> {
        Ok(self.parties(order_id).await?.is_customer(user_id))
    }

    pub async fn is_vendor(&self, user_id: UserId, order_id: OrderId) -> Result<bool, OrderFlowError> {
        Ok(self.parties(order_id).await?.is_vendor(user_id))
    }

    pub async fn is_customer_or_vendor(&self, user_id: UserId, order_id: OrderId) -> Result<bool, OrderFlowError> {
        Ok(self.parties(order_id).await?.is_customer_or_vendor(user_id))
    }

    //----------------------------------------   Periodic jobs   ----------------------------------------------------

    /// Marks every pending order whose invoice has been confirmed as paid
    pub async fn process_paid(&self) -> Result<JobReport, OrderFlowError> {
        let orders = self.db.fetch_pending_orders_with_invoice_status(InvoiceStatus::Confirmed).await?;
        let mut report = JobReport::default();
        for order in orders {
            let result = self.mark_paid(order.id).await;
            tally(&mut report, order.id, "mark as paid", result);
        }
        log_report("process_paid", &report);
        Ok(report)
    }

    /// Cancels every pending order whose invoice has expired
    pub async fn cancel_expired(&self) -> Result<JobReport, OrderFlowError> {
        let orders = self.db.fetch_pending_orders_with_invoice_status(InvoiceStatus::Expired).await?;
        let mut report = JobReport::default();
        for order in orders {
            let result = self.cancel(order.id).await;
            tally(&mut report, order.id, "cancel", result);
        }
        log_report("cancel_expired", &report);
        Ok(report)
    }

    /// Finalizes dispatched orders whose delivery window, including extensions, ran out before `now`. Each of them
    /// receives the default top-grade review.
    pub async fn auto_finalize(&self, now: DateTime<Utc>) -> Result<JobReport, OrderFlowError> {
        let query = OrderQueryFilter::default().with_status(OrderStatusType::Dispatched);
        let orders = self.db.search_orders(query).await?;
        let mut report = JobReport::default();
        for order in orders {
            let dispatched_at = order.dispatched_at.unwrap_or(order.updated_at);
            let window = self.windows.delivery * (1 + order.num_extends as i32);
            if now - dispatched_at <= window {
                continue;
            }
            let result = self.db.finalize_order(order.id, true).await;
            if let Ok(o) = &result {
                info!("🔄️ Order {} finalized automatically after {} extensions", o.id, o.num_extends);
                self.notify(o, Some(OrderStatusType::Dispatched)).await;
            }
            tally(&mut report, order.id, "auto-finalize", result);
        }
        log_report("auto_finalize", &report);
        Ok(report)
    }

    /// Declines and refunds orders the vendor left unattended: paid orders older than the processing window, and
    /// accepted orders not dispatched within the dispatch window.
    pub async fn decline_unhandled(&self, now: DateTime<Utc>) -> Result<JobReport, OrderFlowError> {
        let query =
            OrderQueryFilter::default().with_status(OrderStatusType::Paid).with_status(OrderStatusType::Accepted);
        let orders = self.db.search_orders(query).await?;
        let mut report = JobReport::default();
        for order in orders {
            let overdue = match order.status {
                OrderStatusType::Paid => now - order.created_at > self.windows.processing,
                OrderStatusType::Accepted => {
                    now - order.accepted_at.unwrap_or(order.updated_at) > self.windows.dispatch
                },
                _ => false,
            };
            if !overdue {
                continue;
            }
            let result = self.decline(order.id).await;
            tally(&mut report, order.id, "decline", result);
        }
        log_report("decline_unhandled", &report);
        Ok(report)
    }
}

/// Counts the outcome of one item of a batch job. An order that someone else moved on first is skipped.
fn tally(report: &mut JobReport, order_id: OrderId, action: &str, result: Result<Order, OrderFlowError>) {
    match result {
        Ok(_) => report.processed += 1,
        Err(OrderFlowError::InvalidStatus { current, .. }) => {
            debug!("🔄️ Could not {action} order {order_id}. It is already {current}");
            report.skipped += 1;
        },
        Err(e) => {
            error!("🔄️ Could not {action} order {order_id}. {e}");
            report.failed += 1;
        },
    }
}

fn log_report(job: &str, report: &JobReport) {
    if report.is_empty() {
        trace!("🕰️ {job}: nothing to do");
    } else {
        info!("🕰️ {job}: {report}");
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;
    use crate::db_types::Piconero;

    fn dispatched(num_extends: i64, dispatched_at: DateTime<Utc>) -> Order {
        Order {
            id: OrderId(1),
            customer_id: UserId(1),
            vendor_id: UserId(2),
            delivery_method_id: DeliveryMethodId(1),
            status: OrderStatusType::Dispatched,
            total_price: Piconero::from_xmr(1),
            details: String::new(),
            num_extends,
            created_at: dispatched_at - Duration::days(3),
            accepted_at: Some(dispatched_at - Duration::days(1)),
            dispatched_at: Some(dispatched_at),
            updated_at: dispatched_at,
        }
    }

    fn api() -> OrderFlowApi<()> {
        OrderFlowApi::new((), PriceTable::new(), OrderWindows::default(), EventProducers::default())
    }

    #[test]
    fn first_extension() {
        let api = api();
        let t0 = Utc::now();
        let order = dispatched(0, t0);
        let early = t0 + Duration::days(4);
        assert!(matches!(api.extend_available(&order, early), Err(OrderFlowError::ExtendUnavailable)));
        assert!(api.extend_available(&order, t0 + Duration::days(5)).is_ok());
    }

    #[test]
    fn second_extension() {
        let api = api();
        let t0 = Utc::now();
        let order = dispatched(1, t0);
        // 5 days + one 7 day delivery window
        let early = t0 + Duration::days(11);
        assert!(matches!(api.extend_available(&order, early), Err(OrderFlowError::ReExtendUnavailable)));
        assert!(api.extend_available(&order, t0 + Duration::days(12)).is_ok());
    }

    #[test]
    fn no_third_extension() {
        let api = api();
        let t0 = Utc::now();
        let order = dispatched(2, t0);
        let late = t0 + Duration::days(100);
        assert!(matches!(api.extend_available(&order, late), Err(OrderFlowError::UnableToExtendFurther)));
    }

    #[test]
    fn only_dispatched_orders_extend() {
        let api = api();
        let t0 = Utc::now();
        let mut order = dispatched(0, t0);
        order.status = OrderStatusType::Finalized;
        let err = api.extend_available(&order, t0 + Duration::days(6)).unwrap_err();
        assert!(matches!(err, OrderFlowError::InvalidStatus { current: OrderStatusType::Finalized, .. }));
    }
}
