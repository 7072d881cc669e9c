use std::fmt::Debug;

use log::*;
use rust_decimal::Decimal;

use crate::{
    db_types::{DisputeOffer, DisputeOfferId, Order, OrderId, OrderStatusType, Settlement},
    events::{DisputeSettledEvent, EventProducers, OrderStatusChangedEvent},
    traits::{DisputeError, DisputeManagement, OrderFlowError, OrderManagement},
};

/// `DisputeApi` handles disputed orders: opening the dispute, the vendor's settlement offers, and administrative
/// resolution.
pub struct DisputeApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for DisputeApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DisputeApi")
    }
}

impl<B> DisputeApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    async fn notify_settled(&self, settlement: &Settlement) {
        let changed = OrderStatusChangedEvent::new(settlement.order.clone(), Some(OrderStatusType::Disputed));
        self.producers.order_status_changed(changed).await;
        self.producers.dispute_settled(DisputeSettledEvent::new(settlement.clone())).await;
    }
}

impl<B> DisputeApi<B>
where B: DisputeManagement + OrderManagement
{
    /// Raised by the customer on a dispatched order. Freezes the escrowed funds until the dispute is settled.
    pub async fn dispute(&self, order_id: OrderId) -> Result<Order, OrderFlowError> {
        let order = self.db.dispute_order(order_id).await?;
        info!("⚖️ Order {order_id} is disputed");
        let changed = OrderStatusChangedEvent::new(order.clone(), Some(OrderStatusType::Dispatched));
        self.producers.order_status_changed(changed).await;
        Ok(order)
    }

    /// Records an offer to refund `refund_factor` of the order total to the customer
    pub async fn create_offer(&self, order_id: OrderId, refund_factor: Decimal) -> Result<DisputeOffer, DisputeError> {
        let offer = self.db.insert_dispute_offer(order_id, refund_factor).await?;
        debug!("⚖️ Offer {} to refund {refund_factor} of order {order_id}", offer.id);
        Ok(offer)
    }

    pub async fn offers(&self, order_id: OrderId) -> Result<Vec<DisputeOffer>, DisputeError> {
        self.db.fetch_dispute_offers(order_id).await
    }

    pub async fn fetch_offer(&self, id: DisputeOfferId) -> Result<Option<DisputeOffer>, DisputeError> {
        self.db.fetch_dispute_offer(id).await
    }

    /// The customer accepts a pending offer, which settles the dispute on its terms
    pub async fn accept_offer(&self, id: DisputeOfferId) -> Result<Settlement, DisputeError> {
        let settlement = self.db.accept_dispute_offer(id).await?;
        self.notify_settled(&settlement).await;
        Ok(settlement)
    }

    pub async fn decline_offer(&self, id: DisputeOfferId) -> Result<DisputeOffer, DisputeError> {
        let offer = self.db.decline_dispute_offer(id).await?;
        debug!("⚖️ Offer {id} on order {} declined", offer.order_id);
        Ok(offer)
    }

    /// Settles a dispute on terms set by an administrator, regardless of any offers
    pub async fn force_resolve(&self, order_id: OrderId, refund_factor: Decimal) -> Result<Settlement, DisputeError> {
        let settlement = self.db.force_settlement(order_id, refund_factor).await?;
        info!("⚖️ Dispute on order {order_id} resolved by an administrator");
        self.notify_settled(&settlement).await;
        Ok(settlement)
    }
}
