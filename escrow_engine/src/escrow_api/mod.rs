//! # Escrow engine public API
//!
//! The `escrow_api` module exposes the programmatic API of the settlement core. Each API covers one concern and only
//! asks its backend for the traits it needs, so the worker (or a web frontend) picks the ones it drives.
//!
//! * [`order_flow_api`] takes orders from checkout to finalization, and runs the order reconciliation jobs.
//! * [`invoice_api`] talks to the payment provider about invoices and credits wallet deposits.
//! * [`withdrawal_api`] sends users' withdrawals and follows the transfers until they are confirmed.
//! * [`dispute_api`] handles disputed orders and splits their escrowed funds.
//! * [`wallet_api`] gives access to the escrow wallets.
//! * [`exchange_rate_api`] and [`price_table`] hold the XMR prices used for every fiat conversion.
//!
//! # API usage
//!
//! Every API is created from a backend that implements the traits it requires. Some also take the payment provider
//! and the event producers that receive its notifications.
//!
//! ```rust,ignore
//! use escrow_engine::{SqliteDatabase, WalletApi};
//! let db = SqliteDatabase::new_with_url("sqlite://data/escrow.db", 5).await?;
//! // SqliteDatabase implements WalletManagement
//! let api = WalletApi::new(db);
//! let balance = api.balance(user_id).await?;
//! ```

pub mod dispute_api;
pub mod exchange_rate_api;
pub mod invoice_api;
pub mod order_flow_api;
pub mod order_objects;
pub mod price_table;
pub mod wallet_api;
pub mod withdrawal_api;
