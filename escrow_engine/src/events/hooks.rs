use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{
    DepositCreditedEvent,
    DisputeSettledEvent,
    EventHandler,
    EventProducer,
    Handler,
    OrderStatusChangedEvent,
};

/// The publishing side of the registered hooks. Cloned into every API that emits events.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_status_changed: Vec<EventProducer<OrderStatusChangedEvent>>,
    pub dispute_settled: Vec<EventProducer<DisputeSettledEvent>>,
    pub deposit_credited: Vec<EventProducer<DepositCreditedEvent>>,
}

impl EventProducers {
    pub async fn order_status_changed(&self, event: OrderStatusChangedEvent) {
        for producer in &self.order_status_changed {
            trace!("📬️ Publishing status change of order {} to {}", event.order.id, event.order.status);
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn dispute_settled(&self, event: DisputeSettledEvent) {
        for producer in &self.dispute_settled {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn deposit_credited(&self, event: DepositCreditedEvent) {
        for producer in &self.deposit_credited {
            producer.publish_event(event).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_status_changed: Option<EventHandler<OrderStatusChangedEvent>>,
    pub on_dispute_settled: Option<EventHandler<DisputeSettledEvent>>,
    pub on_deposit_credited: Option<EventHandler<DepositCreditedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_order_status_changed: hooks.on_order_status_changed.map(|f| EventHandler::new(buffer_size, f)),
            on_dispute_settled: hooks.on_dispute_settled.map(|f| EventHandler::new(buffer_size, f)),
            on_deposit_credited: hooks.on_deposit_credited.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_status_changed {
            result.order_status_changed.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_dispute_settled {
            result.dispute_settled.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_deposit_credited {
            result.deposit_credited.push(handler.subscribe());
        }
        result
    }

    /// Spawns a drain task for every registered hook. Each task ends once all producers for it have been dropped.
    pub fn start_handlers(self) {
        if let Some(handler) = self.on_order_status_changed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_dispute_settled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_deposit_credited {
            tokio::spawn(handler.start_handler());
        }
    }
}

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_status_changed: Option<Handler<OrderStatusChangedEvent>>,
    pub on_dispute_settled: Option<Handler<DisputeSettledEvent>>,
    pub on_deposit_credited: Option<Handler<DepositCreditedEvent>>,
}

impl EventHooks {
    pub fn on_order_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderStatusChangedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_dispute_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DisputeSettledEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_dispute_settled = Some(Arc::new(f));
        self
    }

    pub fn on_deposit_credited<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DepositCreditedEvent) -> BoxedFuture) + Send + Sync + 'static {
        self.on_deposit_credited = Some(Arc::new(f));
        self
    }
}
