//! An in-memory [`PaymentProvider`] whose answers the test controls.
use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use rand::{distributions::Alphanumeric, Rng};

use crate::{
    db_types::Piconero,
    traits::{
        Destination,
        InvoiceStatusReport,
        PaymentProvider,
        ProviderError,
        TransferReceipt,
        TransferStatusReport,
    },
};

#[derive(Debug, Default)]
struct MockState {
    invoices: HashMap<String, InvoiceStatusReport>,
    deleted: Vec<String>,
    transfers: HashMap<String, TransferStatusReport>,
    fail_invoices: bool,
    fail_transfers: bool,
}

/// Clones share state, so a test can keep one handle while an API owns another.
#[derive(Debug, Clone, Default)]
pub struct MockPaymentProvider {
    state: Arc<Mutex<MockState>>,
}

fn random_string(prefix: &str, len: usize) -> String {
    let body: String = rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect();
    format!("{prefix}{body}")
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every address handed out so far, deleted or not
    pub fn addresses(&self) -> Vec<String> {
        self.state.lock().invoices.keys().cloned().collect()
    }

    pub fn deleted_addresses(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    /// Simulates funds unlocking at `address`
    pub fn set_unlocked(&self, address: &str, amount: Piconero) {
        let mut state = self.state.lock();
        let report = state.invoices.entry(address.to_string()).or_default();
        report.amount_unlocked = amount;
        report.amount_total = report.amount_total.max(amount);
    }

    pub fn set_confirmations(&self, tx_hash: &str, confirmations: u64) {
        self.state.lock().transfers.entry(tx_hash.to_string()).or_default().confirmations = confirmations;
    }

    pub fn set_transfer_failed(&self, tx_hash: &str) {
        self.state.lock().transfers.entry(tx_hash.to_string()).or_default().failed = true;
    }

    /// Makes every invoice call fail until reset
    pub fn fail_invoices(&self, fail: bool) {
        self.state.lock().fail_invoices = fail;
    }

    /// Makes every transfer call fail until reset
    pub fn fail_transfers(&self, fail: bool) {
        self.state.lock().fail_transfers = fail;
    }

    /// The hashes of all transfers made so far
    pub fn transfers(&self) -> Vec<String> {
        self.state.lock().transfers.keys().cloned().collect()
    }

    pub fn transfer_destinations(&self, tx_hash: &str) -> Vec<Destination> {
        self.state.lock().transfers.get(tx_hash).map(|t| t.destinations.clone()).unwrap_or_default()
    }
}

impl PaymentProvider for MockPaymentProvider {
    async fn invoice(&self, amount: Piconero, _callback_url: &str) -> Result<String, ProviderError> {
        let mut state = self.state.lock();
        if state.fail_invoices {
            return Err(ProviderError::RequestFailed("mock provider is down".into()));
        }
        if amount.value() < 0 {
            return Err(ProviderError::InvalidAmount(amount.to_string()));
        }
        let address = random_string("4", 94);
        state.invoices.insert(address.clone(), InvoiceStatusReport::default());
        Ok(address)
    }

    async fn invoice_status(&self, address: &str) -> Result<InvoiceStatusReport, ProviderError> {
        let state = self.state.lock();
        if state.fail_invoices {
            return Err(ProviderError::RequestFailed("mock provider is down".into()));
        }
        state.invoices.get(address).copied().ok_or_else(|| ProviderError::NotFound(address.to_string()))
    }

    async fn delete_invoice(&self, address: &str) -> Result<(), ProviderError> {
        self.state.lock().deleted.push(address.to_string());
        Ok(())
    }

    async fn transfer(&self, destinations: &[Destination]) -> Result<TransferReceipt, ProviderError> {
        let mut state = self.state.lock();
        if state.fail_transfers {
            return Err(ProviderError::RequestFailed("mock provider is down".into()));
        }
        let hash = random_string("", 64);
        let status = TransferStatusReport { destinations: destinations.to_vec(), confirmations: 0, failed: false };
        state.transfers.insert(hash.clone(), status);
        Ok(TransferReceipt { tx_hash_list: vec![hash] })
    }

    async fn transfer_status(&self, tx_hash: &str) -> Result<TransferStatusReport, ProviderError> {
        self.state.lock().transfers.get(tx_hash).cloned().ok_or_else(|| ProviderError::NotFound(tx_hash.to_string()))
    }
}
