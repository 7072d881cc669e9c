//! # Escrow worker
//! The worker drives the escrow engine in the background. It is responsible for:
//! * Running the periodic order jobs (paid orders, expired invoices, auto-finalization and unhandled orders).
//! * Following invoice payments and wallet deposits at the payment provider.
//! * Sending withdrawals and following their transfers until they are confirmed.
//! * Fetching XMR prices from a public price feed and keeping the in-memory price table fresh.
//!
//! ## Configuration
//! The worker is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: Returns 200 OK once prices have been loaded, and 503 before that.
pub mod cli;
pub mod config;
pub mod errors;
pub mod moneropay;
pub mod price_feed;
pub mod routes;
pub mod scheduler;
pub mod worker;
