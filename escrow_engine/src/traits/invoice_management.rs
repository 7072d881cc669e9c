use thiserror::Error;

use crate::{
    db_types::{DepositProgress, Invoice, InvoiceId, InvoiceStatus, OrderId, Piconero},
    traits::{JobQueueError, ProviderError},
};

#[derive(Debug, Clone, Error)]
pub enum InvoiceError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invoice {0} does not exist")]
    InvoiceNotFound(InvoiceId),
    #[error("Invoice {0} already has a payment address")]
    InvoiceAlreadyPrepared(InvoiceId),
    #[error("Invoice {0} is {1} and can no longer be prepared")]
    InvoiceNotPending(InvoiceId, InvoiceStatus),
    #[error("Payment provider error. {0}")]
    ProviderError(#[from] ProviderError),
    #[error("Job queue error. {0}")]
    JobQueueError(#[from] JobQueueError),
}

impl From<sqlx::Error> for InvoiceError {
    fn from(e: sqlx::Error) -> Self {
        InvoiceError::DatabaseError(e.to_string())
    }
}

#[allow(async_fn_in_trait)]
pub trait InvoiceManagement {
    /// Creates a non-permanent, pending invoice without an address and enqueues the job that will assign one.
    async fn create_invoice(&self, amount: Piconero) -> Result<Invoice, InvoiceError>;

    async fn fetch_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, InvoiceError>;

    async fn fetch_invoice_for_order(&self, order_id: OrderId) -> Result<Option<Invoice>, InvoiceError>;

    /// Attaches a provider address to a pending invoice. Fails with [`InvoiceError::InvoiceAlreadyPrepared`] if an
    /// address is already attached; the existing address is never overwritten. Invoices that have confirmed or expired
    /// fail with [`InvoiceError::InvoiceNotPending`].
    async fn attach_invoice_address(&self, id: InvoiceId, address: &str) -> Result<Invoice, InvoiceError>;

    /// All pending invoices, including those still waiting for an address
    async fn fetch_pending_invoices(&self) -> Result<Vec<Invoice>, InvoiceError>;

    /// Records the outcome of a provider poll, atomically.
    /// * `amount_unlocked` only ever moves up. Lower values are ignored.
    /// * `status`, if given, is applied only while the invoice is still pending.
    async fn update_invoice_progress(
        &self,
        id: InvoiceId,
        amount_unlocked: Piconero,
        status: Option<InvoiceStatus>,
    ) -> Result<Invoice, InvoiceError>;

    async fn fetch_deposit_progress(&self) -> Result<Vec<DepositProgress>, InvoiceError>;

    /// Credits the outstanding amount of a deposit to its wallet and advances `amount_deposited`, in one transaction.
    /// The update is conditional on `amount_deposited` still matching `progress`, so a deposit is never credited
    /// twice. Returns the amount credited, which is zero if another worker got there first.
    async fn credit_deposit(&self, progress: &DepositProgress) -> Result<Piconero, InvoiceError>;
}
