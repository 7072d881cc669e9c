use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::db_types::{Invoice, Order};

/// How a customer pays for an order at checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Funding {
    /// Debit the order total plus fee from the customer's escrow wallet immediately
    Wallet,
    /// Create an invoice for the order total plus fee and wait for the payment to unlock
    Invoice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order: Order,
    /// The invoice the customer must pay, for invoice-funded orders
    pub invoice: Option<Invoice>,
}

/// Summary of one run of a batch job.
///
/// Batch jobs commit each item separately. An item that can no longer be processed because another actor moved it
/// first is `skipped`. Any other per-item error is logged and counted in `failed`, and the batch carries on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl JobReport {
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn merge(self, other: JobReport) -> JobReport {
        JobReport {
            processed: self.processed + other.processed,
            skipped: self.skipped + other.skipped,
            failed: self.failed + other.failed,
        }
    }
}

impl Display for JobReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} processed, {} skipped, {} failed", self.processed, self.skipped, self.failed)
    }
}
