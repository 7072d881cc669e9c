use std::{fmt::Debug, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{
    db_types::{Invoice, InvoiceId, InvoiceStatus, Job, Piconero, PrepareInvoicePayload, PREPARE_INVOICE_JOB},
    events::{DepositCreditedEvent, EventProducers},
    traits::{
        with_timeout,
        InvoiceError,
        InvoiceManagement,
        JobQueue,
        JobQueueError,
        JobReport,
        PaymentProvider,
    },
};

/// How long a claimed job may run before another worker is allowed to pick it up again
pub const JOB_LEASE: Duration = Duration::minutes(5);
/// Each failed attempt pushes the next one back by this much more
pub const JOB_RETRY_BACKOFF: Duration = Duration::seconds(30);

/// `InvoiceApi` connects invoices in the store with the payment provider. It assigns payment addresses, follows
/// payments as they unlock, and credits wallet deposits.
pub struct InvoiceApi<B, P> {
    db: B,
    provider: P,
    callback_url: String,
    provider_timeout: StdDuration,
    producers: EventProducers,
}

impl<B, P> Debug for InvoiceApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InvoiceApi (timeout: {}s)", self.provider_timeout.as_secs())
    }
}

impl<B, P> InvoiceApi<B, P> {
    pub fn new(db: B, provider: P, provider_timeout: StdDuration, producers: EventProducers) -> Self {
        Self { db, provider, callback_url: String::new(), provider_timeout, producers }
    }

    /// The URL the provider should call when a payment arrives. Empty by default, in which case no callback is set.
    pub fn with_callback_url<S: Into<String>>(mut self, url: S) -> Self {
        self.callback_url = url.into();
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<B, P> InvoiceApi<B, P>
where
    B: InvoiceManagement + JobQueue,
    P: PaymentProvider,
{
    pub async fn create_invoice(&self, amount: Piconero) -> Result<Invoice, InvoiceError> {
        let invoice = self.db.create_invoice(amount).await?;
        debug!("🧾️ Invoice {} for {amount} created", invoice.id);
        Ok(invoice)
    }

    /// Asks the provider for a payment address for the invoice and stores it.
    ///
    /// Fails with [`InvoiceError::InvoiceAlreadyPrepared`] if the invoice already has an address, and with
    /// [`InvoiceError::InvoiceNotPending`] if it has expired (or confirmed) in the meantime.
    pub async fn prepare_invoice(&self, id: InvoiceId) -> Result<Invoice, InvoiceError> {
        let invoice = self.db.fetch_invoice(id).await?.ok_or(InvoiceError::InvoiceNotFound(id))?;
        if invoice.address.is_some() {
            return Err(InvoiceError::InvoiceAlreadyPrepared(id));
        }
        if invoice.status != InvoiceStatus::Pending {
            return Err(InvoiceError::InvoiceNotPending(id, invoice.status));
        }
        let address =
            with_timeout(self.provider_timeout, self.provider.invoice(invoice.amount_expected, &self.callback_url))
                .await?;
        match self.db.attach_invoice_address(id, &address).await {
            Ok(invoice) => {
                debug!("🧾️ Invoice {id} is payable at {address}");
                Ok(invoice)
            },
            Err(e) => {
                // Someone else prepared the invoice while we were waiting on the provider
                warn!("🧾️ Could not attach {address} to invoice {id}. Releasing it. {e}");
                if let Err(del) = with_timeout(self.provider_timeout, self.provider.delete_invoice(&address)).await {
                    warn!("🧾️ Could not release {address}. {del}");
                }
                Err(e)
            },
        }
    }

    /// Claims up to `limit` due `prepare_invoice` jobs and runs them.
    ///
    /// A job whose invoice turns out to be prepared already, or no longer pending, counts as done. Other failures are
    /// written back to the job, which is retried after a linearly growing delay until it runs out of attempts.
    pub async fn run_prepare_invoice_jobs(&self, limit: i64, now: DateTime<Utc>) -> Result<JobReport, InvoiceError> {
        let jobs = self.db.claim_jobs(PREPARE_INVOICE_JOB, limit, now, JOB_LEASE).await?;
        let mut report = JobReport::default();
        for job in jobs {
            match self.run_prepare_invoice_job(&job).await {
                Ok(_) => {
                    self.db.complete_job(job.id).await?;
                    report.processed += 1;
                },
                Err(InvoiceError::InvoiceAlreadyPrepared(id)) => {
                    debug!("🧾️ Job {} found invoice {id} already prepared", job.id);
                    self.db.complete_job(job.id).await?;
                    report.skipped += 1;
                },
                Err(InvoiceError::InvoiceNotPending(id, status)) => {
                    debug!("🧾️ Job {} found invoice {id} {status}. Nothing to prepare", job.id);
                    self.db.complete_job(job.id).await?;
                    report.skipped += 1;
                },
                Err(e) => {
                    let retry_at = now + JOB_RETRY_BACKOFF * job.attempts.max(1) as i32;
                    let status = self.db.fail_job(job.id, &e.to_string(), retry_at).await?;
                    warn!("🧾️ Job {} (attempt {}) failed and is now {status}. {e}", job.id, job.attempts);
                    report.failed += 1;
                },
            }
        }
        if !report.is_empty() {
            info!("🧾️ prepare_invoice jobs: {report}");
        }
        Ok(report)
    }

    async fn run_prepare_invoice_job(&self, job: &Job) -> Result<Invoice, InvoiceError> {
        let payload = serde_json::from_str::<PrepareInvoicePayload>(&job.payload)
            .map_err(|e| JobQueueError::InvalidPayload(e.to_string()))?;
        self.prepare_invoice(payload.invoice_id).await
    }

    /// Scans every pending invoice, polling the provider for those that have an address.
    ///
    /// Invoices whose unlocked amount covers the expected amount are confirmed. Otherwise, non-permanent invoices older
    /// than `payment_window` expire, and their address is released at the provider. An invoice that never received an
    /// address expires the same way, without asking the provider. Each invoice is committed on its own. A provider
    /// error aborts the scan, since it most likely affects every invoice.
    pub async fn process_invoices(
        &self,
        now: DateTime<Utc>,
        payment_window: Duration,
    ) -> Result<JobReport, InvoiceError> {
        let invoices = self.db.fetch_pending_invoices().await?;
        let mut report = JobReport::default();
        for invoice in invoices {
            let overdue = !invoice.permanent && now - invoice.created_at > payment_window;
            let Some(address) = invoice.address.as_deref() else {
                if overdue {
                    self.expire_unprepared(&invoice, &mut report).await;
                }
                continue;
            };
            let progress = with_timeout(self.provider_timeout, self.provider.invoice_status(address)).await?;
            let unlocked = progress.amount_unlocked.max(invoice.amount_unlocked);
            let status = if unlocked >= invoice.amount_expected {
                Some(InvoiceStatus::Confirmed)
            } else if overdue {
                Some(InvoiceStatus::Expired)
            } else {
                None
            };
            if status.is_none() && unlocked == invoice.amount_unlocked {
                report.skipped += 1;
                continue;
            }
            match self.db.update_invoice_progress(invoice.id, unlocked, status).await {
                Ok(updated) => {
                    report.processed += 1;
                    trace!("🧾️ Invoice {} now has {unlocked} unlocked and is {}", updated.id, updated.status);
                    if updated.status == InvoiceStatus::Expired && status == Some(InvoiceStatus::Expired) {
                        info!("🧾️ Invoice {} expired with {unlocked} of {} paid", updated.id, updated.amount_expected);
                        if let Err(e) = with_timeout(self.provider_timeout, self.provider.delete_invoice(address)).await
                        {
                            warn!("🧾️ Could not release address {address} of expired invoice {}. {e}", updated.id);
                        }
                    }
                },
                Err(e) => {
                    error!("🧾️ Could not record progress of invoice {}. {e}", invoice.id);
                    report.failed += 1;
                },
            }
        }
        if !report.is_empty() {
            debug!("🧾️ process_invoices: {report}");
        }
        Ok(report)
    }

    async fn expire_unprepared(&self, invoice: &Invoice, report: &mut JobReport) {
        let expired = Some(InvoiceStatus::Expired);
        match self.db.update_invoice_progress(invoice.id, invoice.amount_unlocked, expired).await {
            Ok(updated) => {
                warn!("🧾️ Invoice {} expired before it was given a payment address", updated.id);
                // A prepare job may have attached an address since the scan started
                if let Some(address) = updated.address.as_deref() {
                    if let Err(e) = with_timeout(self.provider_timeout, self.provider.delete_invoice(address)).await {
                        warn!("🧾️ Could not release address {address} of expired invoice {}. {e}", updated.id);
                    }
                }
                report.processed += 1;
            },
            Err(e) => {
                error!("🧾️ Could not expire invoice {}. {e}", invoice.id);
                report.failed += 1;
            },
        }
    }

    /// Credits newly unlocked funds on wallet deposit invoices to their wallets
    pub async fn handle_deposits(&self) -> Result<JobReport, InvoiceError> {
        let deposits = self.db.fetch_deposit_progress().await?;
        let mut report = JobReport::default();
        for deposit in deposits.iter().filter(|d| d.outstanding().is_positive()) {
            match self.db.credit_deposit(deposit).await {
                Ok(amount) if amount.is_positive() => {
                    info!("🧾️ {amount} deposited to the wallet of user {}", deposit.user_id);
                    self.producers.deposit_credited(DepositCreditedEvent::new(deposit.user_id, amount)).await;
                    report.processed += 1;
                },
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    error!("🧾️ Could not credit deposit {}. {e}", deposit.deposit_id);
                    report.failed += 1;
                },
            }
        }
        Ok(report)
    }
}
