//! # Backend traits
//!
//! This module defines the behaviour that storage backends (and the external payment processor) need to expose in
//! order to be driven by the escrow engine APIs.
//!
//! * [`OrderManagement`] owns the order status graph and every status change, each composed atomically with its side
//!   effects.
//! * [`WalletManagement`] is the escrow ledger.
//! * [`InvoiceManagement`] tracks invoices and deposit crediting.
//! * [`WithdrawalManagement`] tracks outbound withdrawals and the transfers that carry them.
//! * [`DisputeManagement`] stores settlement offers and splits escrowed funds.
//! * [`ExchangeRates`] persists crypto prices.
//! * [`JobQueue`] is the durable background job queue.
//! * [`PaymentProvider`] is the contract for the external payment processor.
mod data_objects;
mod dispute_management;
mod exchange_rates;
mod invoice_management;
mod job_queue;
mod order_management;
mod payment_provider;
mod wallet_management;
mod withdrawal_management;

pub use data_objects::{Funding, JobReport, PlacedOrder};
pub use dispute_management::{DisputeError, DisputeManagement};
pub use exchange_rates::{ExchangeRateError, ExchangeRates};
pub use invoice_management::{InvoiceError, InvoiceManagement};
pub use job_queue::{JobQueue, JobQueueError};
pub use order_management::{OrderFlowError, OrderManagement};
pub use payment_provider::{
    Destination,
    InvoiceStatusReport,
    PaymentProvider,
    ProviderError,
    TransferReceipt,
    TransferStatusReport,
    with_timeout,
};
pub use wallet_management::{WalletError, WalletManagement};
pub use withdrawal_management::{WithdrawalError, WithdrawalManagement};
