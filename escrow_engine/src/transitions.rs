//! The order status graph.
//!
//! Every legal move is listed in [`ORDER_TRANSITIONS`] as `target <- acceptable current statuses`. Status updates in
//! the database are written as `UPDATE .. WHERE status IN (valid_predecessors(target))`, so whoever loses a race on the
//! same order sees zero affected rows instead of applying a second, conflicting transition.
//!
//! ```text
//!  pending ──> paid ──> accepted ──> dispatched ──> finalized
//!     │          │          │             │
//!     v          └─> declined <─┘          └──> disputed ──> settled
//! cancelled
//! ```
use crate::db_types::OrderStatusType::{self, *};

pub const ORDER_TRANSITIONS: [(OrderStatusType, &[OrderStatusType]); 9] = [
    (Pending, &[]),
    (Paid, &[Pending]),
    (Cancelled, &[Pending]),
    (Accepted, &[Paid]),
    (Declined, &[Paid, Accepted]),
    (Dispatched, &[Accepted]),
    (Finalized, &[Dispatched]),
    (Disputed, &[Dispatched]),
    (Settled, &[Disputed]),
];

/// The statuses an order must currently have in order to move to `target`. `Pending` is only ever a starting state.
pub fn valid_predecessors(target: OrderStatusType) -> &'static [OrderStatusType] {
    ORDER_TRANSITIONS.iter().find(|(t, _)| *t == target).map(|(_, from)| *from).unwrap_or(&[])
}

pub fn is_valid_transition(from: OrderStatusType, to: OrderStatusType) -> bool {
    valid_predecessors(to).contains(&from)
}
