use std::fmt::Display;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatusType, UserId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub customer_id: Option<UserId>,
    pub vendor_id: Option<UserId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<OrderStatusType>>,
}

impl OrderQueryFilter {
    pub fn with_customer_id(mut self, customer_id: UserId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_vendor_id(mut self, vendor_id: UserId) -> Self {
        self.vendor_id = Some(vendor_id);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() &&
            self.vendor_id.is_none() &&
            self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true) &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No filters.");
        }
        if let Some(cid) = &self.customer_id {
            write!(f, "customer_id: {cid}. ")?;
        }
        if let Some(vid) = &self.vendor_id {
            write!(f, "vendor_id: {vid}. ")?;
        }
        if let Some(statuses) = &self.status {
            let list = statuses.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(",");
            write!(f, "statuses: {list}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since: {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until: {until}. ")?;
        }
        Ok(())
    }
}

/// The time limits that drive the order life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderWindows {
    /// How long an order invoice may stay unpaid before it expires
    pub invoice_payment: Duration,
    /// How long a vendor has to accept a paid order
    pub processing: Duration,
    /// How long a vendor has to dispatch an accepted order
    pub dispatch: Duration,
    /// How long after dispatch an order is finalized automatically. Each extension adds another window.
    pub delivery: Duration,
    /// How long after dispatch the customer must wait before extending the delivery window
    pub extend_unavailable: Duration,
}

pub const DEFAULT_INVOICE_PAYMENT_WINDOW: Duration = Duration::hours(6);
pub const DEFAULT_PROCESSING_WINDOW: Duration = Duration::hours(48);
pub const DEFAULT_DISPATCH_WINDOW: Duration = Duration::hours(72);
pub const DEFAULT_DELIVERY_WINDOW: Duration = Duration::days(7);
pub const DEFAULT_EXTEND_UNAVAILABLE_WINDOW: Duration = Duration::days(5);

impl Default for OrderWindows {
    fn default() -> Self {
        Self {
            invoice_payment: DEFAULT_INVOICE_PAYMENT_WINDOW,
            processing: DEFAULT_PROCESSING_WINDOW,
            dispatch: DEFAULT_DISPATCH_WINDOW,
            delivery: DEFAULT_DELIVERY_WINDOW,
            extend_unavailable: DEFAULT_EXTEND_UNAVAILABLE_WINDOW,
        }
    }
}

/// Who an order belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderParties {
    pub customer_id: UserId,
    pub vendor_id: UserId,
}

impl From<&Order> for OrderParties {
    fn from(order: &Order) -> Self {
        Self { customer_id: order.customer_id, vendor_id: order.vendor_id }
    }
}

impl OrderParties {
    pub fn is_customer(&self, user_id: UserId) -> bool {
        self.customer_id == user_id
    }

    pub fn is_vendor(&self, user_id: UserId) -> bool {
        self.vendor_id == user_id
    }

    pub fn is_customer_or_vendor(&self, user_id: UserId) -> bool {
        self.is_customer(user_id) || self.is_vendor(user_id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_filter_accumulates() {
        let q = OrderQueryFilter::default().with_status(OrderStatusType::Paid).with_status(OrderStatusType::Accepted);
        assert_eq!(q.status, Some(vec![OrderStatusType::Paid, OrderStatusType::Accepted]));
        assert!(!q.is_empty());
        assert_eq!(q.to_string(), "statuses: paid,accepted. ");
        assert!(OrderQueryFilter::default().is_empty());
    }

    #[test]
    fn parties() {
        let p = OrderParties { customer_id: UserId(1), vendor_id: UserId(2) };
        assert!(p.is_customer(UserId(1)));
        assert!(!p.is_vendor(UserId(1)));
        assert!(p.is_customer_or_vendor(UserId(2)));
        assert!(!p.is_customer_or_vendor(UserId(3)));
    }
}
