use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatusType, Piconero, Settlement, UserId};

/// An order moved to a new status. `previous` is `None` for a freshly created order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    pub order: Order,
    pub previous: Option<OrderStatusType>,
}

impl OrderStatusChangedEvent {
    pub fn new(order: Order, previous: Option<OrderStatusType>) -> Self {
        Self { order, previous }
    }

    pub fn created(order: Order) -> Self {
        Self { order, previous: None }
    }

    pub fn status(&self) -> OrderStatusType {
        self.order.status
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeSettledEvent {
    pub settlement: Settlement,
}

impl DisputeSettledEvent {
    pub fn new(settlement: Settlement) -> Self {
        Self { settlement }
    }
}

/// Funds arriving on a wallet's deposit address were credited to its balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositCreditedEvent {
    pub user_id: UserId,
    pub amount: Piconero,
}

impl DepositCreditedEvent {
    pub fn new(user_id: UserId, amount: Piconero) -> Self {
        Self { user_id, amount }
    }
}
