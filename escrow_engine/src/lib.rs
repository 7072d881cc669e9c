//! Escrow Engine
//!
//! The settlement core of an escrow marketplace. Customers pay for orders in XMR, the funds are held in escrow while
//! the vendor fulfils the order, and are released to the vendor (or refunded, fully or in part) when the order ends.
//!
//! The library is divided into these sections:
//! 1. The storage traits ([`mod@traits`]) and their SQLite implementation. Every status change and every ledger
//!    movement happens in one transaction together with its side effects. The data types stored in the database are
//!    public in [`mod@db_types`].
//! 2. The public API ([`mod@escrow_api`]). This is what the worker and any frontend use to place and move orders,
//!    manage wallets, withdraw funds and settle disputes. It also hosts the batch jobs that reconcile the store with
//!    the payment provider.
//!
//! The APIs publish [`events`] after committed changes, which can be hooked into with async closures.
pub mod db_types;
pub mod escrow_api;
pub mod events;
pub mod helpers;
pub mod traits;
pub mod transitions;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use esc_common::{fees, Currency, Piconero};
pub use escrow_api::{
    dispute_api::DisputeApi,
    exchange_rate_api::ExchangeRateApi,
    invoice_api::InvoiceApi,
    order_flow_api::OrderFlowApi,
    order_objects::{OrderQueryFilter, OrderWindows},
    price_table::PriceTable,
    wallet_api::WalletApi,
    withdrawal_api::{WithdrawalApi, WITHDRAWAL_FEE},
};
#[cfg(feature = "sqlite")]
pub use sqlite::{db as sqlite_db, SqliteDatabase};
